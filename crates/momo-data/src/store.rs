//! Dataset Store: the current snapshot behind a single atomic pointer.
//!
//! ```text
//! refresh ──► on_refreshed(rows) ──► ArcSwapOption::store(new snapshot)
//! query   ──► current_snapshot() ──► ArcSwapOption::load_full()  (no lock)
//! ```
//! A reader keeps the `Arc` it loaded for the whole computation, so a
//! concurrent swap never produces a partial view.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};

use momo_core::DatasetRecord;

/// Immutable, fully loaded copy of the dataset.
#[derive(Debug)]
pub struct Snapshot {
    rows: Vec<DatasetRecord>,
    loaded_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(rows: Vec<DatasetRecord>) -> Self {
        Self {
            rows,
            loaded_at: Utc::now(),
        }
    }

    pub fn rows(&self) -> &[DatasetRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Holder of the latest snapshot.
pub struct DatasetStore {
    current: ArcSwapOption<Snapshot>,
}

impl DatasetStore {
    /// Empty store; every query degrades to "data unavailable" until the
    /// first successful refresh.
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// Latest fully loaded snapshot, if any.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Atomically publish a new snapshot.
    pub fn replace_snapshot(&self, rows: Vec<DatasetRecord>) -> Arc<Snapshot> {
        let snapshot = Arc::new(Snapshot::new(rows));
        self.current.store(Some(Arc::clone(&snapshot)));
        snapshot
    }

    /// Refresh collaborator entry point: new rows arrived.
    ///
    /// An empty collection is treated as a failed refresh so a truncated
    /// download never evicts a good snapshot. Returns whether it was applied.
    pub fn on_refreshed(&self, rows: Vec<DatasetRecord>) -> bool {
        if rows.is_empty() {
            self.on_refresh_failed("dataset has no usable rows");
            return false;
        }
        let snapshot = self.replace_snapshot(rows);
        tracing::info!("📦 Dataset snapshot replaced ({} rows)", snapshot.len());
        true
    }

    /// Refresh collaborator entry point: the refresh failed. The prior
    /// snapshot, if any, stays in place.
    pub fn on_refresh_failed(&self, reason: &str) {
        match self.current_snapshot() {
            Some(prev) => tracing::warn!(
                "⚠️ Dataset refresh failed: {reason} (keeping snapshot from {})",
                prev.loaded_at().format("%Y-%m-%d %H:%M UTC")
            ),
            None => tracing::error!("❌ Dataset refresh failed: {reason} (no data loaded yet)"),
        }
    }
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use momo_core::ScopeLevel;

    fn row(observed: i64) -> DatasetRecord {
        DatasetRecord {
            level: ScopeLevel::National,
            scope_name: String::new(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            sex_code: "all".into(),
            age_group_code: "all".into(),
            observed: Some(observed),
            expected: 1,
        }
    }

    #[test]
    fn test_empty_store() {
        let store = DatasetStore::new();
        assert!(store.current_snapshot().is_none());
        store.on_refresh_failed("network down");
        assert!(store.current_snapshot().is_none());
    }

    #[test]
    fn test_failed_refresh_keeps_prior() {
        let store = DatasetStore::new();
        assert!(store.on_refreshed(vec![row(5)]));
        store.on_refresh_failed("timeout");
        assert!(!store.on_refreshed(Vec::new()));
        let snap = store.current_snapshot().unwrap();
        assert_eq!(snap.rows()[0].observed, Some(5));
    }

    #[test]
    fn test_reader_keeps_its_snapshot() {
        let store = DatasetStore::new();
        store.replace_snapshot(vec![row(1)]);
        let held = store.current_snapshot().unwrap();
        store.replace_snapshot(vec![row(2), row(3)]);
        assert_eq!(held.len(), 1);
        assert_eq!(store.current_snapshot().unwrap().len(), 2);
    }
}
