//! Due-set computation
//!
//! The scheduler never mutates anything itself. Each tick it picks the tasks
//! whose scheduled time has just passed and hands them to the lifecycle
//! controller.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::domain::Task;

/// Whether a single task is due at `now`
///
/// A task is due when it has a schedule, is not running, and its scheduled
/// time lies in `(now - window, now]`. A task whose window has passed entirely
/// is never auto-started; it has to be started by hand.
pub fn is_due(task: &Task, now: DateTime<Utc>, window: Duration) -> bool {
    let Some(at) = task.schedule else {
        return false;
    };
    if task.is_running() {
        return false;
    }
    let diff = at - now;
    diff <= Duration::zero() && diff > -window
}

/// Ids of all tasks due at `now`, in row order
pub fn due_set<'a, I>(tasks: I, now: DateTime<Utc>, window: Duration) -> Vec<String>
where
    I: IntoIterator<Item = &'a Task>,
{
    let due: Vec<String> = tasks
        .into_iter()
        .filter(|t| is_due(t, now, window))
        .map(|t| t.id.clone())
        .collect();
    if !due.is_empty() {
        debug!(count = due.len(), %now, "due_set: tasks due");
    }
    due
}
