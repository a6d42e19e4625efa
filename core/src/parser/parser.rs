use super::entry::{LogComponent, LogEntry, LogLevel};
use once_cell::sync::Lazy;
use regex::Regex;

// javac-style "Main.java:3: error: ';' expected"
static JAVAC_DIAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+\.java):(\d+): (error|warning): (.+)$").unwrap());
static JAVAC_NOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Note: (.+)$").unwrap());
static DIAG_SUMMARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+ (errors?|warnings?)$").unwrap());
static BARE_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^error: (.+)$").unwrap());
static BARE_WARNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^warning: (.+)$").unwrap());
static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

/// Classifies captured command output into leveled log entries. One parser
/// instance lives for one build so entry indices stay ordered.
#[derive(Clone)]
pub struct DiagnosticParser {
    log_index: usize,
}

impl DiagnosticParser {
    pub fn new() -> Self {
        Self { log_index: 0 }
    }

    pub fn parse_line(&mut self, line: &str) -> LogEntry {
        let stripped = strip_ansi(line);
        let index = self.log_index;
        self.log_index += 1;

        if let Some(caps) = JAVAC_DIAG.captures(&stripped) {
            let level = match caps.get(3).unwrap().as_str() {
                "error" => LogLevel::Error,
                _ => LogLevel::Warning,
            };
            return LogEntry::new(
                level,
                caps.get(4).unwrap().as_str().to_string(),
                line.to_string(),
                LogComponent::Compiler,
                index,
            )
            .with_location(
                caps.get(1).unwrap().as_str().to_string(),
                caps.get(2).and_then(|m| m.as_str().parse().ok()),
            );
        }

        if let Some(caps) = JAVAC_NOTE.captures(&stripped) {
            return LogEntry::new(
                LogLevel::Debug,
                caps.get(1).unwrap().as_str().to_string(),
                line.to_string(),
                LogComponent::Compiler,
                index,
            );
        }

        if DIAG_SUMMARY.is_match(&stripped) {
            return LogEntry::new(
                LogLevel::Info,
                stripped.clone(),
                line.to_string(),
                LogComponent::Compiler,
                index,
            );
        }

        if let Some(caps) = BARE_ERROR.captures(&stripped) {
            return LogEntry::new(
                LogLevel::Error,
                caps.get(1).unwrap().as_str().to_string(),
                line.to_string(),
                LogComponent::Compiler,
                index,
            );
        }

        if let Some(caps) = BARE_WARNING.captures(&stripped) {
            return LogEntry::new(
                LogLevel::Warning,
                caps.get(1).unwrap().as_str().to_string(),
                line.to_string(),
                LogComponent::Compiler,
                index,
            );
        }

        LogEntry::new(
            LogLevel::Info,
            stripped,
            line.to_string(),
            LogComponent::Other("output".to_string()),
            index,
        )
    }

    pub fn reset(&mut self) {
        self.log_index = 0;
    }
}

impl Default for DiagnosticParser {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_ansi(s: &str) -> String {
    ANSI_ESCAPE.replace_all(s, "").to_string()
}
