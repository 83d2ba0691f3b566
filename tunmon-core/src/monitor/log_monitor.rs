//! Passive log monitor
//!
//! Tails the engine's live log file and raises a signal whenever a line
//! matches a known-fatal signature. Lines written before monitoring
//! started are never replayed: the tail begins at the current end of
//! file, and after rotation or truncation it re-seeks to the new end.

use crate::monitor::signal::{MonitorSignal, SignalKind};
use crate::session::SessionId;
use regex::RegexSet;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

/// How often the tail looks for new lines
const CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Signatures of unrecoverable transport failures in the engine log.
/// Case-insensitive substring patterns, matched per line.
const FATAL_PATTERNS: &[&str] = &[
    r"(?i)connection refused",
    r"(?i)connection reset",
    r"(?i)connection aborted",
    r"(?i)i/o timeout",
    r"(?i)dial tcp",
    r"(?i)dial udp",
    r"(?i)handshake failed",
    r"(?i)tls handshake",
    r"(?i)context deadline exceeded",
    r"(?i)no route to host",
    r"(?i)network is unreachable",
    r"(?i)network is down",
    r"(?i)broken pipe",
    r"(?i)wsarecv:",
    r"(?i)wsasend:",
];

/// Signatures indicating the engine process itself went away
const PROCESS_EXIT_PATTERNS: &[&str] = &[
    r"(?i)process exited",
    r"(?i)process terminated",
    r"(?i)sing-box exited",
    r"(?i)core stopped",
    r"(?i)fatal error",
    r"(?i)panic:",
];

/// Compiled fatal-line classifier
#[derive(Debug)]
pub(crate) struct FatalPatterns {
    fatal: RegexSet,
    process_exit: RegexSet,
}

impl FatalPatterns {
    pub(crate) fn new() -> Self {
        Self {
            // Patterns are compile-time constants; construction cannot fail
            fatal: RegexSet::new(FATAL_PATTERNS).unwrap_or_else(|_| RegexSet::empty()),
            process_exit: RegexSet::new(PROCESS_EXIT_PATTERNS).unwrap_or_else(|_| RegexSet::empty()),
        }
    }

    /// Classify one log line. Process-exit signatures take precedence
    /// over generic transport failures.
    pub(crate) fn classify(&self, line: &str) -> Option<SignalKind> {
        if self.process_exit.is_match(line) {
            Some(SignalKind::ProcessExited)
        } else if self.fatal.is_match(line) {
            Some(SignalKind::LogError)
        } else {
            None
        }
    }
}

/// Tails the engine log for the lifetime of one session
pub(crate) struct PassiveLogMonitor {
    session: SessionId,
    log_file: PathBuf,
    patterns: FatalPatterns,
    signals: mpsc::Sender<MonitorSignal>,
    shutdown: watch::Receiver<bool>,
}

struct TailState {
    reader: BufReader<File>,
    position: u64,
    #[cfg(unix)]
    inode: u64,
}

impl PassiveLogMonitor {
    pub(crate) fn new(
        session: SessionId,
        log_file: PathBuf,
        signals: mpsc::Sender<MonitorSignal>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session,
            log_file,
            patterns: FatalPatterns::new(),
            signals,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(
            "Log monitor started for session {} on {}",
            self.session,
            self.log_file.display()
        );

        let mut tail: Option<TailState> = None;
        let mut ticker = interval(CHECK_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.poll(&mut tail).await {
                        break;
                    }
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        debug!("Log monitor for session {} shutting down", self.session);
                        break;
                    }
                }
            }
        }
    }

    /// One tail cycle. Returns false when the signal channel is closed.
    async fn poll(&mut self, tail: &mut Option<TailState>) -> bool {
        let replaced = match tail.as_ref() {
            Some(state) => self.file_replaced(state).await,
            None => false,
        };
        if replaced {
            *tail = None;
        }

        if tail.is_none() {
            // Missing file is tolerated; the engine may not have
            // created it yet.
            *tail = self.open_at_end().await;
            return true;
        }

        let mut reopen = false;
        if let Some(state) = tail.as_mut() {
            let mut line = String::new();
            loop {
                line.clear();
                match state.reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(n) => {
                        state.position += n as u64;
                        // Partial line without a trailing newline: the
                        // engine is mid-write; rewind and retry next tick
                        if !line.ends_with('\n') {
                            state.position -= n as u64;
                            if state
                                .reader
                                .seek(SeekFrom::Start(state.position))
                                .await
                                .is_err()
                            {
                                reopen = true;
                            }
                            break;
                        }
                        if !self.inspect_line(line.trim_end()).await {
                            return false;
                        }
                    }
                    Err(e) => {
                        warn!("Log read error, reopening: {}", e);
                        reopen = true;
                        break;
                    }
                }
            }
        }
        if reopen {
            *tail = None;
        }
        true
    }

    /// Emit a signal if the line matches a fatal signature.
    /// Returns false when the manager side of the channel is gone.
    async fn inspect_line(&self, line: &str) -> bool {
        if let Some(kind) = self.patterns.classify(line) {
            warn!("Fatal engine log line (session {}): {}", self.session, line);
            let signal = MonitorSignal::with_detail(kind, self.session, line);
            if self.signals.send(signal).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Detect rotation (inode changed) or truncation (file shrank)
    async fn file_replaced(&self, state: &TailState) -> bool {
        let metadata = match tokio::fs::metadata(&self.log_file).await {
            Ok(metadata) => metadata,
            Err(_) => return true,
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if metadata.ino() != state.inode {
                debug!("Log file rotated, reopening at end");
                return true;
            }
        }

        if metadata.len() < state.position {
            debug!("Log file truncated, reopening at end");
            return true;
        }
        false
    }

    /// Open the log file positioned at its current end
    async fn open_at_end(&self) -> Option<TailState> {
        let file = File::open(&self.log_file).await.ok()?;

        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            file.metadata().await.ok()?.ino()
        };

        let mut reader = BufReader::new(file);
        let position = reader.seek(SeekFrom::End(0)).await.ok()?;

        Some(TailState {
            reader,
            position,
            #[cfg(unix)]
            inode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_transport_lines_classified() {
        let patterns = FatalPatterns::new();
        assert_eq!(
            patterns.classify("ERROR dial tcp 1.2.3.4:443: i/o timeout"),
            Some(SignalKind::LogError)
        );
        assert_eq!(
            patterns.classify("WARN Connection Refused by upstream"),
            Some(SignalKind::LogError)
        );
        assert_eq!(
            patterns.classify("error: TLS handshake with proxy failed"),
            Some(SignalKind::LogError)
        );
    }

    #[test]
    fn test_process_exit_takes_precedence() {
        let patterns = FatalPatterns::new();
        assert_eq!(
            patterns.classify("fatal error: dial tcp refused"),
            Some(SignalKind::ProcessExited)
        );
        assert_eq!(
            patterns.classify("panic: runtime error"),
            Some(SignalKind::ProcessExited)
        );
    }

    #[test]
    fn test_ordinary_lines_ignored() {
        let patterns = FatalPatterns::new();
        assert_eq!(patterns.classify("INFO inbound connection from 10.0.0.2"), None);
        assert_eq!(patterns.classify("DEBUG dns lookup example.com ok"), None);
        assert_eq!(patterns.classify(""), None);
    }
}
