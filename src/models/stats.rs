use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{Completion, DailySchedule};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStreak {
    pub activity_id: String,
    pub current: u32,
    pub longest: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
}

/// Streak over a set of completion days. The current run may end today or, when
/// today is not done yet, yesterday.
pub fn streak_for(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> Streak {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for &date in dates {
        run = match prev {
            Some(p) if p.succ_opt() == Some(date) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(date);
    }

    let anchor = if dates.contains(&today) {
        Some(today)
    } else {
        today
            .checked_sub_days(Days::new(1))
            .filter(|yesterday| dates.contains(yesterday))
    };

    let mut current = 0;
    let mut cursor = anchor;
    while let Some(day) = cursor.filter(|d| dates.contains(d)) {
        current += 1;
        cursor = day.pred_opt();
    }

    Streak { current, longest }
}

pub fn activity_streaks(completions: &[Completion], today: NaiveDate) -> Vec<ActivityStreak> {
    let mut by_activity: HashMap<&str, BTreeSet<NaiveDate>> = HashMap::new();
    for completion in completions {
        by_activity
            .entry(completion.activity_id.as_str())
            .or_default()
            .insert(completion.date);
    }

    let mut streaks: Vec<ActivityStreak> = by_activity
        .into_iter()
        .map(|(id, dates)| {
            let streak = streak_for(&dates, today);
            ActivityStreak {
                activity_id: id.to_string(),
                current: streak.current,
                longest: streak.longest,
                total: dates.len() as u32,
            }
        })
        .collect();
    streaks.sort_by(|a, b| {
        b.current
            .cmp(&a.current)
            .then_with(|| a.activity_id.cmp(&b.activity_id))
    });
    streaks
}

/// Consecutive days with at least one completion
pub fn overall_streak(completions: &[Completion], today: NaiveDate) -> Streak {
    let dates: BTreeSet<NaiveDate> = completions.iter().map(|c| c.date).collect();
    streak_for(&dates, today)
}

/// Share of scheduled (date, activity) pairs that were completed
pub fn completion_rate(schedules: &[DailySchedule], completions: &[Completion]) -> f64 {
    let done: HashSet<(NaiveDate, &str)> = completions
        .iter()
        .map(|c| (c.date, c.activity_id.as_str()))
        .collect();

    let mut scheduled = 0usize;
    let mut completed = 0usize;
    for schedule in schedules {
        for id in schedule.all_ids() {
            scheduled += 1;
            if done.contains(&(schedule.date, id)) {
                completed += 1;
            }
        }
    }

    if scheduled == 0 {
        0.0
    } else {
        completed as f64 / scheduled as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeBlock;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn done(day: u32, id: &str) -> Completion {
        Completion::new(d(day), id, TimeBlock::Before9Am)
    }

    #[test]
    fn streak_counts_through_today() {
        let dates: BTreeSet<_> = [d(3), d(4), d(5)].into_iter().collect();
        assert_eq!(streak_for(&dates, d(5)), Streak { current: 3, longest: 3 });
    }

    #[test]
    fn streak_survives_until_today_is_done() {
        let dates: BTreeSet<_> = [d(3), d(4)].into_iter().collect();
        assert_eq!(streak_for(&dates, d(5)).current, 2);
        assert_eq!(streak_for(&dates, d(6)).current, 0);
        assert_eq!(streak_for(&dates, d(6)).longest, 2);
    }

    #[test]
    fn longest_tracks_older_runs() {
        let dates: BTreeSet<_> = [d(1), d(2), d(3), d(4), d(8), d(9)].into_iter().collect();
        assert_eq!(streak_for(&dates, d(9)), Streak { current: 2, longest: 4 });
    }

    #[test]
    fn empty_history_has_no_streak() {
        assert_eq!(streak_for(&BTreeSet::new(), d(9)), Streak::default());
    }

    #[test]
    fn activity_streaks_sorted_by_current() {
        let completions = vec![
            done(3, "run"),
            done(4, "run"),
            done(5, "run"),
            done(5, "plank"),
            done(1, "yoga"),
        ];
        let streaks = activity_streaks(&completions, d(5));
        assert_eq!(streaks[0].activity_id, "run");
        assert_eq!(streaks[0].current, 3);
        assert_eq!(streaks[1].activity_id, "plank");
        assert_eq!(streaks[2].current, 0);
        assert_eq!(streaks[2].total, 1);
    }

    #[test]
    fn overall_streak_uses_any_completion() {
        let completions = vec![done(3, "run"), done(4, "plank"), done(5, "yoga")];
        assert_eq!(overall_streak(&completions, d(5)).current, 3);
    }

    #[test]
    fn completion_rate_over_scheduled_pairs() {
        let mut monday = DailySchedule::new(d(2));
        monday.add(TimeBlock::Before9Am, "run");
        monday.add(TimeBlock::Before9Am, "meditation");
        let mut tuesday = DailySchedule::new(d(3));
        tuesday.add(TimeBlock::Before9Am, "run");
        tuesday.add(TimeBlock::Before9Am, "plank");

        // unscheduled completions do not count
        let completions = vec![done(2, "run"), done(3, "plank"), done(3, "yoga")];
        let rate = completion_rate(&[monday, tuesday], &completions);
        assert!((rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(completion_rate(&[], &completions), 0.0);
    }
}
