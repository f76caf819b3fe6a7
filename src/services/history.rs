//! Daily rate history: bounded, date-deduplicated series
//!
//! Keeps one entry per calendar day so the web chart survives reruns, with
//! the newest observation of a day replacing any earlier one.

use crate::types::{HistoryEntry, RatePoint, Result, StarsRateError, HISTORY_RETENTION_DAYS};
use fs2::FileExt;
use log::{debug, warn};
use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const HISTORY_FILE: &str = "history.json";

/// Merge a point into the series.
///
/// Algorithm:
/// 1. Derive the day from the point's timestamp
/// 2. Replace that day's entry, or append a new one
/// 3. Sort ascending by date
/// 4. Keep only the most recent `HISTORY_RETENTION_DAYS` entries
pub fn merge(mut series: Vec<HistoryEntry>, point: &RatePoint) -> Vec<HistoryEntry> {
    let entry = HistoryEntry::from_point(point);

    match series.iter_mut().find(|e| e.date == entry.date) {
        Some(existing) => *existing = entry,
        None => series.push(entry),
    }

    // Persisted state from older runs may be out of order
    series.sort_by_key(|e| e.date);
    series.dedup_by_key(|e| e.date);

    if series.len() > HISTORY_RETENTION_DAYS {
        let excess = series.len() - HISTORY_RETENTION_DAYS;
        series.drain(..excess);
    }
    series
}

/// Parse a persisted series, recovering from malformed content.
///
/// Anything that is not a JSON array yields an empty series; array elements
/// that do not parse as entries are skipped.
pub fn parse_series(content: &str) -> Vec<HistoryEntry> {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            warn!("history is not valid JSON, starting fresh: {}", e);
            return Vec::new();
        }
    };

    let serde_json::Value::Array(items) = value else {
        warn!("history is not a JSON array, starting fresh");
        return Vec::new();
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping malformed history entry #{}: {}", idx, e);
                None
            }
        })
        .collect()
}

/// Persistence port for the history series
pub trait HistoryRepository {
    /// Load the stored series (empty if nothing usable is stored)
    fn load(&self) -> Result<Vec<HistoryEntry>>;

    /// Replace the stored series
    fn save(&self, series: &[HistoryEntry]) -> Result<()>;
}

/// History stored as a pretty-printed JSON array on disk
pub struct JsonHistoryFile {
    path: PathBuf,
}

impl JsonHistoryFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `history.json` inside an output directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(HISTORY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryRepository for JsonHistoryFile {
    fn load(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            debug!("no history at {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!("cannot read {}: {}", self.path.display(), e);
                return Ok(Vec::new());
            }
        };
        Ok(parse_series(&content))
    }

    fn save(&self, series: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(series)
            .map_err(|e| StarsRateError::History(format!("Serialization failed: {}", e)))?;

        // Truncate only once the lock is held
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;
        file.set_len(0)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        FileExt::unlock(&file)?;
        Ok(())
    }
}

/// In-memory history, for tests and dry runs
#[derive(Default)]
pub struct MemoryHistory {
    series: RefCell<Vec<HistoryEntry>>,
    saves: RefCell<usize>,
}

impl MemoryHistory {
    pub fn with_series(series: Vec<HistoryEntry>) -> Self {
        Self {
            series: RefCell::new(series),
            saves: RefCell::new(0),
        }
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.series.borrow().clone()
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }
}

impl HistoryRepository for MemoryHistory {
    fn load(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.snapshot())
    }

    fn save(&self, series: &[HistoryEntry]) -> Result<()> {
        *self.series.borrow_mut() = series.to_vec();
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

/// Load-merge-save cycle over a repository
pub struct HistoryStore<R> {
    repo: R,
}

impl<R: HistoryRepository> HistoryStore<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn load(&self) -> Result<Vec<HistoryEntry>> {
        self.repo.load()
    }

    /// Merge a point into the stored series.
    ///
    /// Points with `usdt_per_star <= 0` are not recorded and leave storage
    /// untouched; returns whether the series was written.
    pub fn record(&self, point: &RatePoint) -> Result<bool> {
        if point.usdt_per_star <= 0.0 || !point.usdt_per_star.is_finite() {
            warn!(
                "not recording history for incomplete rate {}",
                point.usdt_per_star
            );
            return Ok(false);
        }

        let series = merge(self.repo.load()?, point);
        self.repo.save(&series)?;
        debug!("history now holds {} entries", series.len());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExchangeQuote, MarketplaceQuote};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use tempfile::TempDir;

    fn make_point(year: i32, month: u32, day: u32, ton_per_star: f64, usdt_per_ton: f64) -> RatePoint {
        let marketplace = MarketplaceQuote {
            ton_per_star,
            transactions_count: 10,
            min_rate: ton_per_star,
            max_rate: ton_per_star,
            median_rate: ton_per_star,
            total_stars: 1_000,
            total_ton: ton_per_star * 1_000.0,
        };
        let exchange = ExchangeQuote {
            usdt_per_ton,
            source: "binance".to_string(),
            symbol: "TONUSDT".to_string(),
        };
        RatePoint::from_legs(
            Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
            Ok(marketplace),
            Ok(exchange),
            false,
        )
    }

    fn make_entry(date: NaiveDate, usdt_per_star: f64) -> HistoryEntry {
        HistoryEntry {
            date,
            timestamp: format!("{}T00:00:00Z", date),
            usdt_per_star,
            ton_per_star: 0.002,
            usdt_per_ton: 5.0,
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn create_test_store() -> (HistoryStore<JsonHistoryFile>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::new(JsonHistoryFile::in_dir(temp_dir.path()));
        (store, temp_dir)
    }

    // ========== merge ==========

    #[test]
    fn test_merge_into_empty_appends() {
        let result = merge(Vec::new(), &make_point(2024, 1, 10, 0.002, 5.2));

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].date.to_string(), "2024-01-10");
        assert_eq!(result[0].usdt_per_star, 0.0104);
    }

    #[test]
    fn test_merge_same_day_replaces() {
        let first = merge(Vec::new(), &make_point(2024, 1, 10, 0.002, 5.2));
        let second = merge(first, &make_point(2024, 1, 10, 0.0021, 5.0));

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].ton_per_star, 0.0021);
        assert_eq!(second[0].usdt_per_ton, 5.0);
        assert_eq!(second[0].usdt_per_star, 0.0105);
    }

    #[test]
    fn test_merge_inserts_between_days_in_order() {
        let series = vec![
            make_entry(day("2024-01-01"), 0.01),
            make_entry(day("2024-01-03"), 0.03),
        ];
        let result = merge(series, &make_point(2024, 1, 2, 0.002, 5.2));

        let dates: Vec<String> = result.iter().map(|e| e.date.to_string()).collect();
        assert_eq!(dates, ["2024-01-01", "2024-01-02", "2024-01-03"]);
    }

    #[test]
    fn test_merge_sorts_out_of_order_input() {
        let series = vec![
            make_entry(day("2024-01-05"), 0.05),
            make_entry(day("2024-01-01"), 0.01),
            make_entry(day("2024-01-03"), 0.03),
        ];
        let result = merge(series, &make_point(2024, 1, 4, 0.002, 5.2));

        assert!(result.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_merge_collapses_duplicate_dates_from_storage() {
        let series = vec![
            make_entry(day("2024-01-01"), 0.01),
            make_entry(day("2024-01-01"), 0.02),
        ];
        let result = merge(series, &make_point(2024, 1, 2, 0.002, 5.2));

        assert_eq!(result.len(), 2);
        assert!(result.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_merge_keeps_90_most_recent() {
        let start = day("2024-01-01");
        let series: Vec<HistoryEntry> = (0..95)
            .map(|i| make_entry(start + Duration::days(i), 0.01))
            .collect();
        let point = make_point(2024, 4, 5, 0.002, 5.2); // day index 95
        let result = merge(series, &point);

        assert_eq!(result.len(), HISTORY_RETENTION_DAYS);
        assert_eq!(result[0].date, start + Duration::days(6));
        assert_eq!(result.last().unwrap().date, day("2024-04-05"));
    }

    #[test]
    fn test_merge_truncates_oversized_series_on_same_day_update() {
        let start = day("2024-01-01");
        let series: Vec<HistoryEntry> = (0..95)
            .map(|i| make_entry(start + Duration::days(i), 0.01))
            .collect();
        let last = start + Duration::days(94);
        let point = make_point(2024, 4, 4, 0.002, 5.2);
        assert_eq!(point.date(), last);

        let result = merge(series, &point);
        assert_eq!(result.len(), HISTORY_RETENTION_DAYS);
        assert_eq!(result[0].date, start + Duration::days(5));
        assert_eq!(result.last().unwrap().usdt_per_star, 0.0104);
    }

    // ========== parse_series ==========

    #[test]
    fn test_parse_series_invalid_json() {
        assert!(parse_series("not valid json {{{").is_empty());
    }

    #[test]
    fn test_parse_series_not_an_array() {
        assert!(parse_series(r#"{"date":"2024-01-01"}"#).is_empty());
    }

    #[test]
    fn test_parse_series_skips_malformed_entries() {
        let content = r#"[
            {"date":"2024-01-01","timestamp":"2024-01-01T10:00:00","usdt_per_star":0.01,"ton_per_star":0.002,"usdt_per_ton":5.0},
            {"date":"garbage"},
            42
        ]"#;
        let series = parse_series(content);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].date, day("2024-01-01"));
    }

    // ========== JsonHistoryFile / HistoryStore ==========

    #[test]
    fn test_missing_file_loads_empty() {
        let (store, _temp) = create_test_store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_record_persists_and_reloads() {
        let (store, _temp) = create_test_store();

        assert!(store.record(&make_point(2024, 1, 10, 0.002, 5.2)).unwrap());
        assert!(store.record(&make_point(2024, 1, 11, 0.002, 5.0)).unwrap());

        let reloaded = JsonHistoryFile::new(store.repository().path().to_path_buf())
            .load()
            .unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[1].usdt_per_star, 0.01);
    }

    #[test]
    fn test_record_same_day_twice_keeps_one_entry() {
        let (store, _temp) = create_test_store();

        store.record(&make_point(2024, 1, 10, 0.002, 5.2)).unwrap();
        store.record(&make_point(2024, 1, 10, 0.003, 5.0)).unwrap();

        let series = store.load().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].usdt_per_star, 0.015);
    }

    #[test]
    fn test_record_skips_zero_rate() {
        let (store, _temp) = create_test_store();
        store.record(&make_point(2024, 1, 10, 0.002, 5.2)).unwrap();
        let before = fs::read_to_string(store.repository().path()).unwrap();

        let failed = make_point(2024, 1, 11, 0.0, 5.2);
        assert!(!store.record(&failed).unwrap());

        let after = fs::read_to_string(store.repository().path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_record_skips_zero_rate_without_creating_file() {
        let (store, _temp) = create_test_store();
        assert!(!store.record(&make_point(2024, 1, 11, 0.002, 0.0)).unwrap());
        assert!(!store.repository().path().exists());
    }

    #[test]
    fn test_corrupted_file_recovers_as_empty() {
        let (store, _temp) = create_test_store();
        fs::write(store.repository().path(), "not valid json {{{").unwrap();

        assert!(store.record(&make_point(2024, 1, 10, 0.002, 5.2)).unwrap());
        let series = store.load().unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_save_shrinks_file() {
        let (store, _temp) = create_test_store();
        let repo = store.repository();
        let big: Vec<HistoryEntry> = (0..10)
            .map(|i| make_entry(day("2024-01-01") + Duration::days(i), 0.01))
            .collect();
        repo.save(&big).unwrap();
        repo.save(&big[..1]).unwrap();

        // No trailing bytes from the longer write
        assert_eq!(repo.load().unwrap().len(), 1);
    }

    #[test]
    fn test_history_path_format() {
        let (store, temp) = create_test_store();
        assert_eq!(store.repository().path(), temp.path().join("history.json"));
    }

    #[test]
    fn test_memory_history_counts_saves() {
        let store = HistoryStore::new(MemoryHistory::default());
        store.record(&make_point(2024, 1, 10, 0.002, 5.2)).unwrap();
        store.record(&make_point(2024, 1, 10, 0.0, 5.2)).unwrap();

        assert_eq!(store.repository().save_count(), 1);
        assert_eq!(store.repository().snapshot().len(), 1);
    }
}
