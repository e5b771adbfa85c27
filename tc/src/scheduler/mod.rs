//! Scheduler: periodic due-task detection

mod config;
mod core;

pub use config::SchedulerConfig;
pub use self::core::{due_set, is_due};
