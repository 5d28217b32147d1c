use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::reorder::adjust_for_removal;
use super::Catalog;

/// Segment of the day an activity is assigned to, in day order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeBlock {
    #[serde(rename = "before-9am")]
    Before9Am,
    #[serde(rename = "before-12pm")]
    Before12Pm,
    #[serde(rename = "before-3pm")]
    Before3Pm,
    #[serde(rename = "before-6pm")]
    Before6Pm,
    #[serde(rename = "before-9pm")]
    Before9Pm,
}

impl TimeBlock {
    pub const ALL: [TimeBlock; 5] = [
        TimeBlock::Before9Am,
        TimeBlock::Before12Pm,
        TimeBlock::Before3Pm,
        TimeBlock::Before6Pm,
        TimeBlock::Before9Pm,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TimeBlock::Before9Am => "Before 9 AM",
            TimeBlock::Before12Pm => "Before 12 PM",
            TimeBlock::Before3Pm => "Before 3 PM",
            TimeBlock::Before6Pm => "Before 6 PM",
            TimeBlock::Before9Pm => "Before 9 PM",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            TimeBlock::Before9Am => "before-9am",
            TimeBlock::Before12Pm => "before-12pm",
            TimeBlock::Before3Pm => "before-3pm",
            TimeBlock::Before6Pm => "before-6pm",
            TimeBlock::Before9Pm => "before-9pm",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.key() == key)
    }

    /// Hour of day (exclusive) at which the block ends
    pub fn end_hour(&self) -> u32 {
        match self {
            TimeBlock::Before9Am => 9,
            TimeBlock::Before12Pm => 12,
            TimeBlock::Before3Pm => 15,
            TimeBlock::Before6Pm => 18,
            TimeBlock::Before9Pm => 21,
        }
    }

    /// Hour of day at which the block starts; the first block covers the whole early morning
    pub fn start_hour(&self) -> u32 {
        match self.prev() {
            Some(prev) => prev.end_hour(),
            None => 0,
        }
    }

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|b| b == self).unwrap_or(0)
    }

    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn prev(&self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Block covering the given hour; late evening folds into the last block
    pub fn containing(hour: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|b| hour < b.end_hour())
            .unwrap_or(TimeBlock::Before9Pm)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySchedule {
    pub date: NaiveDate,
    #[serde(default)]
    pub blocks: BTreeMap<TimeBlock, Vec<String>>,
}

impl DailySchedule {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            blocks: BTreeMap::new(),
        }
    }

    /// Seed a schedule with activities in their default blocks
    pub fn from_defaults<'a>(
        date: NaiveDate,
        catalog: &Catalog,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut schedule = Self::new(date);
        for id in ids {
            if let Some(activity) = catalog.get(id) {
                schedule.add(activity.default_block, id);
            }
        }
        schedule
    }

    pub fn activities(&self, block: TimeBlock) -> &[String] {
        self.blocks.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn block_of(&self, id: &str) -> Option<TimeBlock> {
        self.blocks
            .iter()
            .find(|(_, ids)| ids.iter().any(|i| i == id))
            .map(|(block, _)| *block)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.block_of(id).is_some()
    }

    /// All scheduled ids in block order
    pub fn all_ids(&self) -> Vec<&str> {
        TimeBlock::ALL
            .iter()
            .flat_map(|b| self.activities(*b).iter().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, block: TimeBlock, id: &str) {
        let index = self.activities(block).len();
        self.insert(block, index, id);
    }

    /// Insert at a clamped position; an id already scheduled elsewhere today is moved
    pub fn insert(&mut self, block: TimeBlock, index: usize, id: &str) {
        let mut index = index;
        if let Some(existing) = self.block_of(id) {
            let ids = self.blocks.entry(existing).or_default();
            if let Some(pos) = ids.iter().position(|i| i == id) {
                ids.remove(pos);
                if existing == block {
                    index = adjust_for_removal(pos, index);
                }
            }
        }
        let ids = self.blocks.entry(block).or_default();
        let index = index.min(ids.len());
        ids.insert(index, id.to_string());
        self.prune();
    }

    pub fn remove(&mut self, id: &str) -> Option<TimeBlock> {
        let block = self.block_of(id)?;
        if let Some(ids) = self.blocks.get_mut(&block) {
            ids.retain(|i| i != id);
        }
        self.prune();
        Some(block)
    }

    /// Reorder inside one block; out-of-range positions are ignored
    pub fn move_within(&mut self, block: TimeBlock, from: usize, to: usize) -> bool {
        let Some(ids) = self.blocks.get_mut(&block) else {
            return false;
        };
        if from >= ids.len() || to >= ids.len() || from == to {
            return false;
        }
        let id = ids.remove(from);
        ids.insert(to, id);
        true
    }

    /// Move an id to `index` in `block`, where `index` counts positions before the move
    pub fn move_to_block(&mut self, id: &str, block: TimeBlock, index: usize) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.insert(block, index, id);
        true
    }

    fn prune(&mut self) {
        self.blocks.retain(|_, ids| !ids.is_empty());
    }
}

/// Move an activity from today's schedule to the same block tomorrow
pub fn push_to_tomorrow(today: &mut DailySchedule, tomorrow: &mut DailySchedule, id: &str) -> bool {
    let Some(block) = today.remove(id) else {
        return false;
    };
    tomorrow.add(block, id);
    true
}
