//! The `check-config` command: validate and summarize the configuration

use colored::Colorize;
use std::path::Path;
use tunmon_core::error::TunmonError;
use tunmon_core::TunmonConfig;

pub fn run_check_config(config_path: &Path) -> Result<(), TunmonError> {
    let config = TunmonConfig::from_file(config_path)?;

    println!("{} {}", "✓".green(), "Configuration is valid".bold());
    println!("  log_file:        {}", config.engine.log_file.display());
    println!("  metrics_url:     {}", config.engine.metrics_url);
    println!(
        "  monitoring:      {}",
        if config.monitoring.monitoring_enabled() {
            "enabled".green()
        } else {
            "disabled".yellow()
        }
    );
    println!(
        "  poll interval:   {}s (stall after {} flat polls, epsilon {}B)",
        config.monitoring.poll_interval_secs,
        config.monitoring.consecutive_stall_polls,
        config.monitoring.stall_epsilon_bytes
    );
    println!(
        "  reconnect:       up to {} attempts, backoff {}s x{} capped at {}s",
        config.monitoring.max_reconnect_attempts,
        config.monitoring.backoff_base_secs,
        config.monitoring.backoff_multiplier,
        config.monitoring.backoff_cap_secs
    );

    Ok(())
}
