use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Catalog, DailySchedule, TimeBlock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSelection {
    pub activity_id: String,
    pub times_per_week: u8,
    #[serde(default)]
    pub block: Option<TimeBlock>,
}

/// The user's chosen weekly activity mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPlanConfig {
    pub selections: Vec<PlanSelection>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SavedPlanConfig {
    fn default() -> Self {
        Self {
            selections: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl SavedPlanConfig {
    /// Insert or replace the selection for an activity; frequency is clamped to 1..=7
    pub fn set(&mut self, activity_id: &str, times_per_week: u8, block: Option<TimeBlock>) {
        let times_per_week = times_per_week.clamp(1, 7);
        match self
            .selections
            .iter_mut()
            .find(|s| s.activity_id == activity_id)
        {
            Some(existing) => {
                existing.times_per_week = times_per_week;
                existing.block = block;
            }
            None => self.selections.push(PlanSelection {
                activity_id: activity_id.to_string(),
                times_per_week,
                block,
            }),
        }
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, activity_id: &str) -> bool {
        let before = self.selections.len();
        self.selections.retain(|s| s.activity_id != activity_id);
        self.updated_at = Utc::now();
        self.selections.len() != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekPlan {
    pub week_start: NaiveDate,
    pub days: BTreeMap<NaiveDate, DailySchedule>,
}

impl WeekPlan {
    pub fn key(&self) -> String {
        self.week_start.format("%Y-%m-%d").to_string()
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DailySchedule> {
        self.days.get(&date)
    }
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday() as u64;
    date - Days::new(offset)
}

/// Spread each selection evenly across the week in its block
pub fn generate(config: &SavedPlanConfig, catalog: &Catalog, week_start: NaiveDate) -> WeekPlan {
    let mut days: BTreeMap<NaiveDate, DailySchedule> = (0..7u64)
        .map(|i| {
            let date = week_start + Days::new(i);
            (date, DailySchedule::new(date))
        })
        .collect();

    for selection in &config.selections {
        let Some(activity) = catalog.get(&selection.activity_id) else {
            tracing::warn!("Skipping unknown activity in plan: {}", selection.activity_id);
            continue;
        };
        let block = selection.block.unwrap_or(activity.default_block);
        let n = selection.times_per_week.clamp(1, 7) as u64;

        for i in 0..n {
            let date = week_start + Days::new(i * 7 / n);
            if let Some(day) = days.get_mut(&date) {
                day.add(block, &activity.id);
            }
        }
    }

    WeekPlan { week_start, days }
}
