//! Run-scoped event log.
//!
//! Every skip, send and error of one run lands here (and is mirrored to the
//! `log` facade). The rendered text becomes the body and attachment of the
//! end-of-run report. One `RunLog` per run; nothing is process-global, so
//! tests can drive independent runs side by side.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::util::utc_stamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: Level,
    pub message: String,
}

#[derive(Debug)]
pub struct RunLog {
    run_id: Uuid,
    entries: Vec<LogEntry>,
    error_count: usize,
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            entries: Vec::new(),
            error_count: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.push(Level::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.push(Level::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{}", message);
        self.error_count += 1;
        self.push(Level::Error, message);
    }

    fn push(&mut self, level: Level, message: String) {
        self.entries.push(LogEntry {
            at: Utc::now(),
            level,
            message,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Render as `{ts} [{LEVEL}] {msg}` lines.
    pub fn render_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} [{}] {}", utc_stamp(e.at), e.level.as_str(), e.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}
