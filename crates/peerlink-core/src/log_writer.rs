// Adapter turning the membership transport's text log lines into tracing events

use std::io;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, error, info, warn};

static INFO_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[INFO\] (.+)").expect("Invalid regex pattern"));
static DEBUG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[DEBUG\] (.+)").expect("Invalid regex pattern"));
static WARN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[WARN\] (.+)").expect("Invalid regex pattern"));
static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[ERROR\] (.+)").expect("Invalid regex pattern"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
    Error,
}

/// Parse a transport log line into its level and message
///
/// Lines without a recognized `[LEVEL]` tag yield `None`.
pub fn parse_line(line: &str) -> Option<(LogLevel, &str)> {
    let text = line.trim();
    [
        (LogLevel::Info, &*INFO_LINE),
        (LogLevel::Debug, &*DEBUG_LINE),
        (LogLevel::Warn, &*WARN_LINE),
        (LogLevel::Error, &*ERROR_LINE),
    ]
    .into_iter()
    .find_map(|(level, pattern)| {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| (level, m.as_str()))
    })
}

/// [`io::Write`] sink for the membership transport's logs
///
/// Every write is treated as one log line. Unrecognized lines are dropped.
#[derive(Clone, Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    pub fn new() -> Self {
        Self
    }
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        match parse_line(&text) {
            Some((LogLevel::Info, msg)) => info!(target: "peerlink_core::membership", "{}", msg),
            Some((LogLevel::Debug, msg)) => debug!(target: "peerlink_core::membership", "{}", msg),
            Some((LogLevel::Warn, msg)) => warn!(target: "peerlink_core::membership", "{}", msg),
            Some((LogLevel::Error, msg)) => error!(target: "peerlink_core::membership", "{}", msg),
            None => {}
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
