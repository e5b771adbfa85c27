//! LifecycleController - Stopped/Running transitions
//!
//! Owns the automation port handle. Every transition flips task state
//! synchronously and hands the matching command to the port; the port's
//! answer never rolls a transition back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{ProductParseError, Task, TaskSpec, TaskState};
use crate::tasks::TaskStore;

use super::port::{AutomationPort, Delays, StartOptions};

/// Message shown on a task right after it was started
pub const STARTING_MESSAGE: &str = "Starting task!";

/// Drives task state through the automation port
#[derive(Clone)]
pub struct LifecycleController {
    port: Arc<dyn AutomationPort>,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController").finish_non_exhaustive()
    }
}

impl LifecycleController {
    pub fn new(port: Arc<dyn AutomationPort>) -> Self {
        Self { port }
    }

    /// Port handle, for issuing rate fetches
    pub fn port(&self) -> Arc<dyn AutomationPort> {
        Arc::clone(&self.port)
    }

    /// Create tasks from a spec
    pub fn create(
        &self,
        store: &mut TaskStore,
        spec: &TaskSpec,
        amount: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, ProductParseError> {
        debug!(amount, "LifecycleController::create: called");
        store.create(spec, amount, now)
    }

    /// Start every listed task that is not already running
    ///
    /// Returns the ids that were actually started. Running tasks are skipped
    /// and never see a second start command.
    pub fn start(&self, store: &mut TaskStore, ids: &[String], delays: Delays, proxies: &[String]) -> Vec<String> {
        debug!(count = ids.len(), "LifecycleController::start: called");
        let to_start: Vec<Task> = ids
            .iter()
            .filter_map(|id| store.get(id))
            .filter(|t| !t.is_running())
            .cloned()
            .collect();
        if to_start.is_empty() {
            debug!("LifecycleController::start: nothing to start");
            return Vec::new();
        }

        if let Err(e) = self.port.register_proxies(proxies) {
            warn!(error = %e, "Failed to register proxies");
        }
        if let Err(e) = self.port.start(&to_start, &StartOptions { delays }) {
            warn!(error = %e, "Start command not acknowledged");
        }

        let started: Vec<String> = to_start.into_iter().map(|t| t.id).collect();
        for id in &started {
            if let Some(task) = store.get_mut(id) {
                task.state = TaskState::Running;
                task.message = STARTING_MESSAGE.to_string();
            }
        }
        info!(count = started.len(), "Started tasks");
        started
    }

    /// Stop every listed task that is running
    pub fn stop(&self, store: &mut TaskStore, ids: &[String]) -> Vec<String> {
        debug!(count = ids.len(), "LifecycleController::stop: called");
        let to_stop: Vec<Task> = ids
            .iter()
            .filter_map(|id| store.get(id))
            .filter(|t| t.is_running())
            .cloned()
            .collect();
        if to_stop.is_empty() {
            debug!("LifecycleController::stop: nothing to stop");
            return Vec::new();
        }

        if let Err(e) = self.port.stop(&to_stop) {
            warn!(error = %e, "Stop command not acknowledged");
        }

        let stopped: Vec<String> = to_stop.into_iter().map(|t| t.id).collect();
        for id in &stopped {
            if let Some(task) = store.get_mut(id) {
                task.state = TaskState::Stopped;
                task.message.clear();
            }
        }
        info!(count = stopped.len(), "Stopped tasks");
        stopped
    }

    /// Stop whatever is running among `ids`, then delete them all
    pub fn remove(&self, store: &mut TaskStore, ids: &[String]) -> Vec<Task> {
        debug!(count = ids.len(), "LifecycleController::remove: called");
        self.stop(store, ids);
        let removed = store.remove_all(ids);
        info!(count = removed.len(), "Removed tasks");
        removed
    }

    /// Copy a task under a fresh id, stopped and unselected
    pub fn duplicate(&self, store: &mut TaskStore, id: &str) -> Option<Task> {
        debug!(%id, "LifecycleController::duplicate: called");
        store.duplicate(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Store;
    use crate::lifecycle::port::{PortCall, RecordingPort};

    fn setup(port: Arc<RecordingPort>, n: u32) -> (LifecycleController, TaskStore, Vec<String>) {
        let controller = LifecycleController::new(port);
        let mut store = TaskStore::new();
        let spec = TaskSpec::new(Store::new("Kith", "https://kith.com"), "+box");
        let ids = controller
            .create(&mut store, &spec, n, Utc::now())
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        (controller, store, ids)
    }

    fn delays() -> Delays {
        Delays {
            monitor_ms: 3500,
            error_ms: 2000,
        }
    }

    #[test]
    fn test_start_only_stopped_tasks() {
        let port = Arc::new(RecordingPort::new());
        let (controller, mut store, ids) = setup(port.clone(), 2);
        let (a, b) = (ids[0].clone(), ids[1].clone());
        store.get_mut(&b).unwrap().state = TaskState::Running;

        let started = controller.start(&mut store, &ids, delays(), &["p:1".into()]);

        assert_eq!(started, vec![a.clone()]);
        assert_eq!(port.started(), vec![vec![a.clone()]]);
        assert_eq!(store.get(&a).unwrap().state, TaskState::Running);
        assert_eq!(store.get(&a).unwrap().message, STARTING_MESSAGE);
        assert_eq!(store.get(&b).unwrap().message, "");
    }

    #[test]
    fn test_start_registers_proxies_then_starts_with_delays() {
        let port = Arc::new(RecordingPort::new());
        let (controller, mut store, ids) = setup(port.clone(), 1);
        controller.start(&mut store, &ids, delays(), &["p:1".into()]);

        let calls = port.calls();
        assert_eq!(calls[0], PortCall::RegisterProxies(vec!["p:1".into()]));
        assert_eq!(
            calls[1],
            PortCall::Start {
                ids: ids.clone(),
                options: StartOptions { delays: delays() },
            }
        );
    }

    #[test]
    fn test_start_all_running_issues_nothing() {
        let port = Arc::new(RecordingPort::new());
        let (controller, mut store, ids) = setup(port.clone(), 1);
        controller.start(&mut store, &ids, delays(), &[]);
        let before = port.calls().len();

        assert!(controller.start(&mut store, &ids, delays(), &[]).is_empty());
        assert_eq!(port.calls().len(), before);
    }

    #[test]
    fn test_start_keeps_optimistic_state_when_port_offline() {
        let port = Arc::new(RecordingPort::offline());
        let (controller, mut store, ids) = setup(port, 1);
        let started = controller.start(&mut store, &ids, delays(), &[]);
        assert_eq!(started, ids);
        assert!(store.get(&ids[0]).unwrap().is_running());
    }

    #[test]
    fn test_stop_only_running_and_clears_message() {
        let port = Arc::new(RecordingPort::new());
        let (controller, mut store, ids) = setup(port.clone(), 2);
        controller.start(&mut store, &ids[..1], delays(), &[]);

        let stopped = controller.stop(&mut store, &ids);
        assert_eq!(stopped, vec![ids[0].clone()]);
        assert_eq!(port.stopped(), vec![vec![ids[0].clone()]]);
        let task = store.get(&ids[0]).unwrap();
        assert_eq!(task.state, TaskState::Stopped);
        assert!(task.message.is_empty());
    }

    #[test]
    fn test_remove_stops_running_first() {
        let port = Arc::new(RecordingPort::new());
        let (controller, mut store, ids) = setup(port.clone(), 2);
        controller.start(&mut store, &ids[..1], delays(), &[]);

        let removed = controller.remove(&mut store, &ids);
        assert_eq!(removed.len(), 2);
        assert!(store.is_empty());
        assert_eq!(port.stopped(), vec![vec![ids[0].clone()]]);
    }

    #[test]
    fn test_remove_stopped_tasks_sends_no_stop() {
        let port = Arc::new(RecordingPort::new());
        let (controller, mut store, ids) = setup(port.clone(), 1);
        controller.remove(&mut store, &ids);
        assert!(port.stopped().is_empty());
    }

    #[test]
    fn test_duplicate_of_running_task_is_stopped() {
        let port = Arc::new(RecordingPort::new());
        let (controller, mut store, ids) = setup(port, 1);
        controller.start(&mut store, &ids, delays(), &[]);

        let copy = controller.duplicate(&mut store, &ids[0]).unwrap();
        assert_eq!(copy.state, TaskState::Stopped);
        assert!(copy.message.is_empty());
        assert_eq!(store.get(&ids[0]).unwrap().message, STARTING_MESSAGE);
        assert_eq!(store.len(), 2);
        assert!(controller.duplicate(&mut store, "missing").is_none());
    }
}
