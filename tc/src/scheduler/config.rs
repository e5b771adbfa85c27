//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Tick period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// How long after its due time a task may still be auto-started
    #[serde(default = "default_due_window_secs")]
    pub due_window_secs: u64,
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_due_window_secs() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            due_window_secs: default_due_window_secs(),
        }
    }
}

impl SchedulerConfig {
    /// Tick period as a Duration (never zero)
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Acceptance window as a chrono Duration
    pub fn due_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.due_window_secs as i64)
    }
}
