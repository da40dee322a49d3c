use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_CAPACITY: usize = 200;
const MAX_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnparsableDate,
    UnparsableYear,
    UnparsableMonth,
    InvalidAmount,
    MissingAmount,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnparsableDate => "unparsable date",
            Self::UnparsableYear => "unparsable year",
            Self::UnparsableMonth => "unparsable month",
            Self::InvalidAmount => "invalid amount",
            Self::MissingAmount => "missing amount",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipStats {
    pub count: usize,
    pub samples: Vec<String>,
}

pub type SkipSummary = BTreeMap<SkipReason, SkipStats>;

/// Per-parse log collector. Entries live in a bounded ring buffer and are
/// mirrored to `tracing`; skipped rows are tallied instead of logged one by one.
#[derive(Debug)]
pub struct Diagnostics {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    skipped: SkipSummary,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            skipped: SkipSummary::new(),
        }
    }

    fn push(&mut self, level: Level, message: String) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message,
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.push(Level::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.push(Level::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.push(Level::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.push(Level::Error, message);
    }

    pub fn record_skip(&mut self, reason: SkipReason, sample: impl Into<String>) {
        let stats = self.skipped.entry(reason).or_default();
        stats.count += 1;
        let sample = sample.into();
        if stats.samples.len() < MAX_SAMPLES && !stats.samples.contains(&sample) {
            stats.samples.push(sample);
        }
    }

    pub fn skipped(&self) -> &SkipSummary {
        &self.skipped
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().map(|s| s.count).sum()
    }

    /// Logs one warning per skip reason; called once at the end of a parse.
    pub fn flush_skips(&mut self) {
        let lines: Vec<String> = self
            .skipped
            .iter()
            .map(|(reason, stats)| {
                format!(
                    "skipped {} cell(s)/row(s): {reason} (e.g. {})",
                    stats.count,
                    stats.samples.join(", ")
                )
            })
            .collect();
        for line in lines {
            self.warn(line);
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_keeps_latest_entries() {
        let mut d = Diagnostics::new(3);
        for i in 0..5 {
            d.info(format!("entry {i}"));
        }
        let messages: Vec<String> = d.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn test_levels_are_recorded() {
        let mut d = Diagnostics::default();
        d.debug("a");
        d.warn("b");
        d.error("c");
        let levels: Vec<Level> = d.entries().into_iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![Level::Debug, Level::Warn, Level::Error]);
    }

    #[test]
    fn test_skip_samples_are_bounded_and_distinct() {
        let mut d = Diagnostics::default();
        for i in 0..10 {
            d.record_skip(SkipReason::InvalidAmount, format!("bad{}", i % 7));
        }
        d.record_skip(SkipReason::UnparsableMonth, "Smarch");
        let stats = &d.skipped()[&SkipReason::InvalidAmount];
        assert_eq!(stats.count, 10);
        assert_eq!(stats.samples.len(), MAX_SAMPLES);
        assert_eq!(d.skipped_total(), 11);
    }

    #[test]
    fn test_flush_skips_logs_one_warning_per_reason() {
        let mut d = Diagnostics::default();
        d.record_skip(SkipReason::InvalidAmount, "x");
        d.record_skip(SkipReason::UnparsableDate, "y");
        d.flush_skips();
        let entries = d.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.level == Level::Warn));
        assert!(entries[0].message.contains("unparsable date"));
    }
}
