mod coach;

pub use coach::{local_suggestions, Coach, CoachContext};
