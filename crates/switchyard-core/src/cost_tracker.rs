//! Usage and cost accounting
//!
//! Records are append-only. They are persisted as JSON Lines, one
//! [`UsageRecord`] per line; `flush` appends whatever has not been written
//! yet and `load` replays the file.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{CoreResult, ModelRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub command: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        command: impl Into<String>,
        model: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
            input_tokens,
            output_tokens,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Aggregate over a set of records. Empty selections are all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

impl UsageStats {
    fn add(&mut self, record: &UsageRecord, cost: f64) {
        self.requests += 1;
        self.input_tokens += record.input_tokens;
        self.output_tokens += record.output_tokens;
        self.total_tokens += record.input_tokens + record.output_tokens;
        self.total_cost_usd += cost;
    }
}

#[derive(Default)]
struct TrackerState {
    records: Vec<UsageRecord>,
    /// Number of leading records already present in the store.
    flushed: usize,
    totals: UsageStats,
}

pub struct CostTracker {
    registry: Arc<ModelRegistry>,
    store: Option<PathBuf>,
    state: Mutex<TrackerState>,
}

/// `<data_dir>/switchyard/usage.jsonl`
pub fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("switchyard").join("usage.jsonl"))
}

impl CostTracker {
    /// In-memory tracker; `flush` and `load` are no-ops.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            store: None,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn with_store(registry: Arc<ModelRegistry>, path: impl Into<PathBuf>) -> Self {
        Self {
            store: Some(path.into()),
            ..Self::new(registry)
        }
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    fn cost_of(&self, record: &UsageRecord) -> f64 {
        self.registry
            .get_pricing(&record.model)
            .cost(record.input_tokens, record.output_tokens)
    }

    pub fn record_usage(&self, record: UsageRecord) {
        let cost = self.cost_of(&record);
        tracing::debug!(
            command = %record.command,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost_usd = cost,
            "recorded usage"
        );
        let mut state = self.state.lock();
        state.totals.add(&record, cost);
        state.records.push(record);
    }

    pub fn get_stats(&self) -> UsageStats {
        self.state.lock().totals
    }

    pub fn get_usage_by_date(&self, date: NaiveDate) -> UsageStats {
        self.aggregate(|r| r.timestamp.date_naive() == date)
    }

    pub fn get_usage_by_command(&self, command: &str) -> UsageStats {
        self.aggregate(|r| r.command == command)
    }

    pub fn get_usage_by_model(&self) -> BTreeMap<String, UsageStats> {
        let state = self.state.lock();
        let mut by_model: BTreeMap<String, UsageStats> = BTreeMap::new();
        for record in &state.records {
            by_model
                .entry(record.model.clone())
                .or_default()
                .add(record, self.cost_of(record));
        }
        by_model
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.state.lock().records.clone()
    }

    fn aggregate(&self, filter: impl Fn(&UsageRecord) -> bool) -> UsageStats {
        let state = self.state.lock();
        let mut stats = UsageStats::default();
        for record in state.records.iter().filter(|r| filter(r)) {
            stats.add(record, self.cost_of(record));
        }
        stats
    }

    /// Append unflushed records to the store.
    pub fn flush(&self) -> CoreResult<()> {
        let Some(path) = &self.store else {
            return Ok(());
        };

        let mut state = self.state.lock();
        if state.flushed == state.records.len() {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        let mut buffer = String::new();
        let start = state.flushed;
        for record in &state.records[start..] {
            let line = serde_json::to_string(record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }
        file.write_all(buffer.as_bytes())?;

        let written = state.records.len() - state.flushed;
        state.flushed = state.records.len();
        tracing::debug!(path = %path.display(), written, "flushed usage records");
        Ok(())
    }

    /// Replay the store. Records already on disk replace the flushed part of
    /// the in-memory log; unflushed records are kept after them. Lines that
    /// do not parse are skipped.
    pub fn load(&self) -> CoreResult<()> {
        let Some(path) = &self.store else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(path)?;
        let mut loaded = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<UsageRecord>(line) {
                Ok(record) => loaded.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), line = lineno + 1, error = %e, "skipping malformed usage record");
                }
            }
        }

        let mut state = self.state.lock();
        let already_flushed = state.flushed;
        let pending = state.records.split_off(already_flushed);
        let flushed = loaded.len();
        loaded.extend(pending);

        let mut totals = UsageStats::default();
        for record in &loaded {
            totals.add(record, self.cost_of(record));
        }

        state.records = loaded;
        state.flushed = flushed;
        state.totals = totals;
        tracing::debug!(path = %path.display(), records = flushed, "loaded usage records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn tracker() -> CostTracker {
        CostTracker::new(Arc::new(ModelRegistry::builtin()))
    }

    #[test]
    fn test_gpt4o_cost() {
        let tracker = tracker();
        tracker.record_usage(UsageRecord::new("review", "openai/gpt-4o", 10_000, 2_000));
        let stats = tracker.get_stats();
        assert!((stats.total_cost_usd - 0.045).abs() < 1e-9);
        assert_eq!(stats.total_tokens, 12_000);
        assert_eq!(stats.requests, 1);
    }

    #[test]
    fn test_local_and_default_are_free() {
        let tracker = tracker();
        tracker.record_usage(UsageRecord::new("a", "ollama/llama3.1", 50_000, 50_000));
        tracker.record_usage(UsageRecord::new("a", "default", 50_000, 50_000));
        tracker.record_usage(UsageRecord::new("a", "claude", 1, 1));
        assert_eq!(tracker.get_stats().total_cost_usd, 0.0);
        assert_eq!(tracker.get_stats().total_tokens, 100_002);
    }

    #[test]
    fn test_by_date_and_command() {
        let tracker = tracker();
        let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        tracker.record_usage(UsageRecord::new("plan", "openai/gpt-4o", 1_000, 0).with_timestamp(day1));
        tracker.record_usage(UsageRecord::new("review", "openai/gpt-4o", 2_000, 0).with_timestamp(day2));

        let d1 = tracker.get_usage_by_date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(d1.input_tokens, 1_000);
        assert_eq!(tracker.get_usage_by_command("review").input_tokens, 2_000);

        assert_eq!(
            tracker.get_usage_by_date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
            UsageStats::default()
        );
        assert_eq!(tracker.get_usage_by_command("missing"), UsageStats::default());
    }

    #[test]
    fn test_by_model() {
        let tracker = tracker();
        tracker.record_usage(UsageRecord::new("a", "openai/gpt-4o", 10, 10));
        tracker.record_usage(UsageRecord::new("b", "openai/gpt-4o", 10, 10));
        tracker.record_usage(UsageRecord::new("c", "ollama/llama3.1", 5, 5));
        let by_model = tracker.get_usage_by_model();
        assert_eq!(by_model["openai/gpt-4o"].requests, 2);
        assert_eq!(by_model["ollama/llama3.1"].total_tokens, 10);
    }

    #[test]
    fn test_flush_then_load_reproduces_totals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("usage.jsonl");
        let registry = Arc::new(ModelRegistry::builtin());

        let first = CostTracker::with_store(registry.clone(), &path);
        first.record_usage(UsageRecord::new("review", "openai/gpt-4o", 10_000, 2_000));
        first.record_usage(UsageRecord::new("plan", "gemini/gemini-2.0-flash", 3_000, 700));
        first.flush().unwrap();
        // Second flush must not duplicate lines.
        first.flush().unwrap();

        let second = CostTracker::with_store(registry, &path);
        second.load().unwrap();
        assert_eq!(second.get_stats(), first.get_stats());
        assert_eq!(second.records().len(), 2);
    }

    #[test]
    fn test_incremental_flush_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.jsonl");
        let registry = Arc::new(ModelRegistry::builtin());

        let tracker = CostTracker::with_store(registry.clone(), &path);
        tracker.record_usage(UsageRecord::new("a", "openai/gpt-4o", 1, 1));
        tracker.flush().unwrap();
        tracker.record_usage(UsageRecord::new("b", "openai/gpt-4o", 2, 2));
        tracker.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_load_skips_malformed_lines_and_keeps_pending() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.jsonl");
        let good = serde_json::to_string(&UsageRecord::new("a", "openai/gpt-4o", 100, 0)).unwrap();
        fs::write(&path, format!("{}\nnot json\n\n", good)).unwrap();

        let tracker = CostTracker::with_store(Arc::new(ModelRegistry::builtin()), &path);
        tracker.record_usage(UsageRecord::new("b", "openai/gpt-4o", 5, 0));
        tracker.load().unwrap();

        let records = tracker.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].command, "a");
        assert_eq!(records[1].command, "b");
        assert_eq!(tracker.get_stats().input_tokens, 105);
    }

    #[test]
    fn test_in_memory_flush_is_noop() {
        let tracker = tracker();
        tracker.record_usage(UsageRecord::new("a", "openai/gpt-4o", 1, 1));
        tracker.flush().unwrap();
        tracker.load().unwrap();
        assert_eq!(tracker.records().len(), 1);
    }
}
