use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TimeBlock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub activity_id: String,
    pub time_block: TimeBlock,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachAdvice {
    pub suggestions: Vec<Suggestion>,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoachStatus {
    #[default]
    Idle,
    Thinking,
    Ready,
    Failed,
    Offline,
}
