use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub content_id: String,
    pub current_time: f64,
    pub duration: f64,
    /// `100 * current_time / duration`, recomputed on every upsert.
    pub percentage: f64,
    pub last_watched_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(content_id: &str, current_time: f64, duration: f64, now: DateTime<Utc>) -> Self {
        Self {
            content_id: content_id.to_string(),
            current_time,
            duration,
            percentage: 100.0 * current_time / duration,
            last_watched_at: now,
        }
    }
}
