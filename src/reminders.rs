use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::{Catalog, DailySchedule, TimeBlock};

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub date: NaiveDate,
    pub block: TimeBlock,
    pub pending: Vec<String>,
}

impl Reminder {
    pub fn message(&self) -> String {
        format!(
            "{} ends soon: {} left ({})",
            self.block.label(),
            self.pending.len(),
            self.pending.join(", ")
        )
    }
}

/// Fires at most one reminder per (date, block), within `lead` of the block's end
pub struct ReminderScheduler {
    lead: Duration,
    fired: HashSet<(NaiveDate, TimeBlock)>,
}

impl ReminderScheduler {
    pub fn new(lead_minutes: u32) -> Self {
        Self {
            lead: Duration::minutes(lead_minutes as i64),
            fired: HashSet::new(),
        }
    }

    pub fn due(
        &mut self,
        now: NaiveDateTime,
        schedule: &DailySchedule,
        done: &HashSet<String>,
        catalog: &Catalog,
    ) -> Vec<Reminder> {
        if schedule.date != now.date() {
            return Vec::new();
        }

        let mut reminders = Vec::new();
        for block in TimeBlock::ALL {
            let Some(block_end) = schedule.date.and_hms_opt(block.end_hour(), 0, 0) else {
                continue;
            };
            if now < block_end - self.lead || now >= block_end {
                continue;
            }
            if self.fired.contains(&(schedule.date, block)) {
                continue;
            }

            let pending: Vec<String> = schedule
                .activities(block)
                .iter()
                .filter(|id| !done.contains(*id))
                .map(|id| catalog.name_of(id).to_string())
                .collect();
            if pending.is_empty() {
                continue;
            }

            self.fired.insert((schedule.date, block));
            reminders.push(Reminder {
                date: schedule.date,
                block,
                pending,
            });
        }

        // keep the fired set from growing across days
        let today = now.date();
        self.fired.retain(|(date, _)| *date >= today);
        reminders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    fn schedule() -> DailySchedule {
        let mut schedule = DailySchedule::new(day());
        schedule.add(TimeBlock::Before9Am, "meditation");
        schedule.add(TimeBlock::Before9Am, "run");
        schedule.add(TimeBlock::Before12Pm, "pushups");
        schedule
    }

    #[test]
    fn fires_once_inside_lead_window() {
        let catalog = Catalog::default();
        let mut scheduler = ReminderScheduler::new(30);
        let done = HashSet::new();

        assert!(scheduler.due(at(8, 0), &schedule(), &done, &catalog).is_empty());

        let due = scheduler.due(at(8, 40), &schedule(), &done, &catalog);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].block, TimeBlock::Before9Am);
        assert_eq!(due[0].pending, vec!["Meditation", "Run"]);
        assert_eq!(
            due[0].message(),
            "Before 9 AM ends soon: 2 left (Meditation, Run)"
        );

        assert!(scheduler.due(at(8, 50), &schedule(), &done, &catalog).is_empty());
        // after the block ended nothing fires for it
        assert!(scheduler.due(at(9, 5), &schedule(), &done, &catalog).is_empty());
    }

    #[test]
    fn completed_blocks_are_silent() {
        let catalog = Catalog::default();
        let mut scheduler = ReminderScheduler::new(30);
        let done: HashSet<String> = ["pushups".to_string()].into_iter().collect();
        assert!(scheduler.due(at(11, 45), &schedule(), &done, &catalog).is_empty());
    }

    #[test]
    fn other_days_are_ignored() {
        let catalog = Catalog::default();
        let mut scheduler = ReminderScheduler::new(30);
        let tomorrow = day().succ_opt().unwrap().and_hms_opt(8, 45, 0).unwrap();
        assert!(scheduler
            .due(tomorrow, &schedule(), &HashSet::new(), &catalog)
            .is_empty());
    }
}
