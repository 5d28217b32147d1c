mod activity;
mod completion;
pub mod plan;
pub mod reorder;
mod schedule;
pub mod stats;
mod suggestion;

pub use activity::{Activity, Catalog, Category};
pub use completion::{Completion, CompletionSource};
pub use plan::{SavedPlanConfig, WeekPlan};
pub use schedule::{push_to_tomorrow, DailySchedule, TimeBlock};
pub use suggestion::{CoachAdvice, CoachStatus, Suggestion};
