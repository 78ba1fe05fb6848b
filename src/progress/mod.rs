//! Resume points per content id.
//!
//! Every mutation writes the whole table through the gateway before
//! returning, so the persisted copy lags the in-memory table by at most one
//! failed write.

mod record;

pub use record::ProgressRecord;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, error, info, warn};

use crate::{config::ProgressPolicy, error::PlaybackError, storage::PersistenceGateway};

pub const PROGRESS_KEY: &str = "video-progress";

pub type SharedProgress = Arc<Mutex<ProgressStore>>;

pub struct ProgressStore {
    gateway: Arc<dyn PersistenceGateway>,
    policy: ProgressPolicy,
    records: HashMap<String, ProgressRecord>,
}

impl ProgressStore {
    /// Loads the persisted table. A missing, unreadable or corrupt document
    /// yields an empty table.
    pub fn load(gateway: Arc<dyn PersistenceGateway>, policy: ProgressPolicy) -> Self {
        let records = match gateway.get_item(PROGRESS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<HashMap<String, ProgressRecord>>(&raw) {
                Ok(records) => records,
                Err(err) => {
                    error!("Discarding unreadable progress table: {err}");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(err) => {
                error!("Failed to load progress table: {err:#}");
                HashMap::new()
            }
        };

        info!("Loaded {} resume points", records.len());

        Self {
            gateway,
            policy,
            records,
        }
    }

    pub fn into_shared(self) -> SharedProgress {
        Arc::new(Mutex::new(self))
    }

    pub fn policy(&self) -> &ProgressPolicy {
        &self.policy
    }

    /// Whether a position is inside the window worth remembering.
    pub fn in_resume_window(&self, current_time: f64, duration: f64) -> bool {
        is_valid_duration(duration)
            && current_time > self.policy.min_resume_secs
            && current_time < duration * self.policy.completion_ratio
    }

    pub fn record(&mut self, content_id: &str, current_time: f64, duration: f64) -> bool {
        self.record_at(content_id, current_time, duration, Utc::now())
    }

    /// Upserts the resume point when it falls inside the window; otherwise
    /// leaves the table (and storage) untouched. Returns whether it wrote.
    pub fn record_at(
        &mut self,
        content_id: &str,
        current_time: f64,
        duration: f64,
        now: DateTime<Utc>,
    ) -> bool {
        if !is_valid_duration(duration) {
            debug!("{}", PlaybackError::InvalidDuration(duration));
            return false;
        }
        if !self.in_resume_window(current_time, duration) {
            return false;
        }

        self.records.insert(
            content_id.to_string(),
            ProgressRecord::new(content_id, current_time, duration, now),
        );
        self.persist();
        true
    }

    /// Drops the record for finished content. Safe to call repeatedly.
    pub fn complete(&mut self, content_id: &str) {
        if self.records.remove(content_id).is_some() {
            info!("Cleared resume point for completed {content_id}");
        }
        self.persist();
    }

    pub fn cleanup(&mut self, threshold_days: i64) -> usize {
        self.cleanup_at(threshold_days, Utc::now())
    }

    /// Removes records last watched strictly before `now - threshold_days`.
    /// A window reaching past the representable range keeps everything.
    pub fn cleanup_at(&mut self, threshold_days: i64, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = ChronoDuration::try_days(threshold_days)
            .and_then(|window| now.checked_sub_signed(window))
        else {
            debug!("Progress cleanup window of {threshold_days} days is out of range; keeping all records");
            return 0;
        };
        let before = self.records.len();
        self.records
            .retain(|_, record| record.last_watched_at >= cutoff);
        let removed = before - self.records.len();

        info!("Progress cleanup removed {removed} records older than {threshold_days} days");
        self.persist();
        removed
    }

    pub fn clear_all(&mut self) {
        self.records.clear();
        self.persist();
    }

    pub fn get(&self, content_id: &str) -> Option<&ProgressRecord> {
        self.records.get(content_id)
    }

    /// All records, most recently watched first.
    pub fn all(&self) -> Vec<ProgressRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(|a, b| b.last_watched_at.cmp(&a.last_watched_at));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.records)
            .map_err(anyhow::Error::from)
            .and_then(|serialized| self.gateway.set_item(PROGRESS_KEY, &serialized));

        if let Err(err) = result {
            warn!("{}", PlaybackError::storage(PROGRESS_KEY, &err));
        }
    }
}

pub fn is_valid_duration(duration: f64) -> bool {
    duration.is_finite() && duration > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryGateway;
    use chrono::TimeZone;

    fn store() -> (Arc<MemoryGateway>, ProgressStore) {
        let gateway = Arc::new(MemoryGateway::new());
        let store = ProgressStore::load(gateway.clone(), ProgressPolicy::default());
        (gateway, store)
    }

    #[test]
    fn records_position_inside_window() {
        let (gateway, mut store) = store();

        assert!(store.record("abc123", 42.0, 300.0));

        let record = store.get("abc123").unwrap();
        assert_eq!(record.current_time, 42.0);
        assert_eq!(record.duration, 300.0);
        assert_eq!(record.percentage, 14.0);
        assert_eq!(gateway.write_count(), 1);
    }

    #[test]
    fn ignores_positions_outside_window() {
        let (gateway, mut store) = store();

        assert!(!store.record("abc123", 298.0, 300.0));
        assert!(!store.record("abc123", 285.0, 300.0));
        assert!(!store.record("abc123", 5.0, 300.0));
        assert!(!store.record("abc123", 3.0, 300.0));
        assert!(!store.record("abc123", 42.0, 0.0));
        assert!(!store.record("abc123", 42.0, f64::NAN));

        assert!(store.get("abc123").is_none());
        assert_eq!(gateway.write_count(), 0);
    }

    #[test]
    fn upsert_recomputes_percentage() {
        let (_, mut store) = store();
        store.record("v", 10.0, 100.0);
        store.record("v", 50.0, 200.0);

        let record = store.get("v").unwrap();
        assert_eq!(record.percentage, 25.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn complete_is_idempotent() {
        let (_, mut store) = store();
        store.record("v", 60.0, 100.0);

        store.complete("v");
        assert!(store.get("v").is_none());
        store.complete("v");
        assert!(store.is_empty());
    }

    #[test]
    fn cleanup_keeps_boundary_records() {
        let (_, mut store) = store();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();

        store.record_at("old", 60.0, 100.0, now - ChronoDuration::days(31));
        store.record_at(
            "just-old",
            60.0,
            100.0,
            now - ChronoDuration::days(30) - ChronoDuration::seconds(1),
        );
        store.record_at("boundary", 60.0, 100.0, now - ChronoDuration::days(30));
        store.record_at("fresh", 60.0, 100.0, now - ChronoDuration::days(2));

        assert_eq!(store.cleanup_at(30, now), 2);
        assert!(store.get("old").is_none());
        assert!(store.get("just-old").is_none());
        assert!(store.get("boundary").is_some());
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn cleanup_with_huge_window_keeps_everything() {
        let (_, mut store) = store();
        store.record("a", 20.0, 100.0);
        store.record("b", 30.0, 100.0);

        assert_eq!(store.cleanup(i64::MAX), 0);
        assert_eq!(store.cleanup(i64::MAX / 86_400), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn table_survives_reload() {
        let (gateway, mut store) = store();
        store.record("a", 20.0, 100.0);
        store.record("b", 30.0, 100.0);
        store.complete("a");

        let reloaded = ProgressStore::load(gateway, ProgressPolicy::default());
        assert!(reloaded.get("a").is_none());
        assert_eq!(reloaded.get("b").unwrap().current_time, 30.0);
    }

    #[test]
    fn write_failure_keeps_in_memory_table() {
        let (gateway, mut store) = store();
        gateway.set_fail_writes(true);

        assert!(store.record("v", 20.0, 100.0));
        assert_eq!(store.get("v").unwrap().current_time, 20.0);
        assert_eq!(gateway.get_item(PROGRESS_KEY).unwrap(), None);
    }

    #[test]
    fn corrupt_document_loads_empty() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_item(PROGRESS_KEY, "{broken").unwrap();

        let store = ProgressStore::load(gateway, ProgressPolicy::default());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_all_and_listing() {
        let (_, mut store) = store();
        let now = Utc::now();
        store.record_at("older", 20.0, 100.0, now - ChronoDuration::hours(1));
        store.record_at("newer", 20.0, 100.0, now);

        let ids: Vec<_> = store.all().into_iter().map(|r| r.content_id).collect();
        assert_eq!(ids, vec!["newer".to_string(), "older".to_string()]);

        store.clear_all();
        assert!(store.is_empty());
    }
}
