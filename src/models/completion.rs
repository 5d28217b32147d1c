use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::TimeBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionSource {
    #[default]
    Manual,
    Strava,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub date: NaiveDate,
    pub activity_id: String,
    pub time_block: TimeBlock,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub source: CompletionSource,
}

impl Completion {
    pub fn new(date: NaiveDate, activity_id: &str, time_block: TimeBlock) -> Self {
        Self {
            date,
            activity_id: activity_id.to_string(),
            time_block,
            completed_at: Utc::now(),
            source: CompletionSource::Manual,
        }
    }

    /// Storage key; there is at most one completion per (date, activity)
    pub fn key(&self) -> String {
        Self::key_for(self.date, &self.activity_id)
    }

    pub fn key_for(date: NaiveDate, activity_id: &str) -> String {
        format!("{}:{}", date.format("%Y-%m-%d"), activity_id)
    }
}
