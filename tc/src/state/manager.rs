//! StateManager - actor that owns the StateContainer
//!
//! Commands are applied one at a time in arrival order. Rate fetches run as
//! separate tokio tasks and report back through the actor's own channel, so
//! their results are just more commands in the queue.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::{Profile, Site, Task, TaskSpec};
use crate::lifecycle::{AutomationPort, RateRequest};
use crate::rates::{FetchOutcome, FetchStatus, INCOMPLETE_RESPONSE};
use crate::scheduler::SchedulerConfig;
use crate::tasks::{BulkEdit, TaskEdit};

use super::container::{Settings, StateContainer};
use super::messages::{StateCommand, StateError, StateEvent, StateResponse};

const COMMAND_BUFFER: usize = 256;

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
    /// Broadcast sender for state change notifications
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateManager {
    /// Spawn a new StateManager actor owning `state`
    pub fn spawn(state: StateContainer, event_capacity: usize) -> Self {
        debug!(event_capacity, "StateManager::spawn: called");
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));

        tokio::spawn(actor_loop(state, rx, tx.downgrade(), event_tx.clone()));

        info!("StateManager spawned");
        Self { tx, event_tx }
    }

    /// Subscribe to state change events
    pub fn subscribe_events(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> StateCommand) -> Result<T, StateError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)
    }

    // === Task operations ===

    /// Create `amount` tasks; rejected as a whole if the product does not parse
    pub async fn create_tasks(&self, spec: TaskSpec, amount: u32) -> StateResponse<Vec<Task>> {
        debug!(product = %spec.product, amount, "create_tasks: called");
        self.request(|reply| StateCommand::CreateTasks { spec, amount, reply })
            .await?
    }

    pub async fn get_task(&self, id: &str) -> StateResponse<Option<Task>> {
        debug!(%id, "get_task: called");
        self.request(|reply| StateCommand::GetTask {
            id: id.to_string(),
            reply,
        })
        .await
    }

    /// Get a task, returning an error if it does not exist
    pub async fn get_task_required(&self, id: &str) -> StateResponse<Task> {
        debug!(%id, "get_task_required: called");
        self.get_task(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Task {}", id)))
    }

    pub async fn list_tasks(&self) -> StateResponse<Vec<Task>> {
        debug!("list_tasks: called");
        self.request(|reply| StateCommand::ListTasks { reply }).await
    }

    pub async fn edit_task(&self, id: Option<String>, edit: TaskEdit) -> StateResponse<bool> {
        debug!(?id, ?edit, "edit_task: called");
        self.request(|reply| StateCommand::EditTask { id, edit, reply })
            .await?
    }

    pub async fn edit_all(&self, ids: Vec<String>, edit: BulkEdit) -> StateResponse<usize> {
        debug!(count = ids.len(), ?edit, "edit_all: called");
        self.request(|reply| StateCommand::EditAll { ids, edit, reply })
            .await?
    }

    pub async fn duplicate_task(&self, id: &str) -> StateResponse<Option<Task>> {
        debug!(%id, "duplicate_task: called");
        self.request(|reply| StateCommand::DuplicateTask {
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub async fn select_task(&self, id: &str, range: bool) -> StateResponse<bool> {
        debug!(%id, range, "select_task: called");
        self.request(|reply| StateCommand::SelectTask {
            id: id.to_string(),
            range,
            reply,
        })
        .await
    }

    pub async fn select_all(&self) -> StateResponse<()> {
        debug!("select_all: called");
        self.request(|reply| StateCommand::SelectAll { reply }).await
    }

    /// Apply worker status messages keyed by task id
    pub async fn apply_status(&self, messages: HashMap<String, String>) -> StateResponse<usize> {
        debug!(count = messages.len(), "apply_status: called");
        self.request(|reply| StateCommand::ApplyStatus { messages, reply })
            .await
    }

    pub async fn clear_store_reference(&self, store_url: &str) -> StateResponse<usize> {
        debug!(%store_url, "clear_store_reference: called");
        self.request(|reply| StateCommand::ClearStoreReference {
            store_url: store_url.to_string(),
            reply,
        })
        .await
    }

    // === Lifecycle operations ===

    pub async fn start_tasks(&self, ids: Vec<String>) -> StateResponse<Vec<String>> {
        debug!(count = ids.len(), "start_tasks: called");
        self.request(|reply| StateCommand::StartTasks { ids, reply }).await
    }

    pub async fn start_all(&self) -> StateResponse<Vec<String>> {
        debug!("start_all: called");
        self.request(|reply| StateCommand::StartAll { reply }).await
    }

    pub async fn stop_tasks(&self, ids: Vec<String>) -> StateResponse<Vec<String>> {
        debug!(count = ids.len(), "stop_tasks: called");
        self.request(|reply| StateCommand::StopTasks { ids, reply }).await
    }

    pub async fn stop_all(&self) -> StateResponse<Vec<String>> {
        debug!("stop_all: called");
        self.request(|reply| StateCommand::StopAll { reply }).await
    }

    pub async fn remove_tasks(&self, ids: Vec<String>) -> StateResponse<Vec<Task>> {
        debug!(count = ids.len(), "remove_tasks: called");
        self.request(|reply| StateCommand::RemoveTasks { ids, reply }).await
    }

    /// Run one scheduler pass at `now`; returns the ids started
    pub async fn tick(&self, now: DateTime<Utc>) -> StateResponse<Vec<String>> {
        self.request(|reply| StateCommand::Tick { now, reply }).await
    }

    // === Profile operations ===

    pub async fn add_profile(&self, profile: Profile) -> StateResponse<String> {
        debug!(name = %profile.name, "add_profile: called");
        self.request(|reply| StateCommand::AddProfile { profile, reply }).await
    }

    pub async fn get_profile(&self, id: &str) -> StateResponse<Option<Profile>> {
        debug!(%id, "get_profile: called");
        self.request(|reply| StateCommand::GetProfile {
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub async fn list_profiles(&self) -> StateResponse<Vec<Profile>> {
        debug!("list_profiles: called");
        self.request(|reply| StateCommand::ListProfiles { reply }).await
    }

    pub async fn update_profile(&self, id: &str, profile: Profile) -> StateResponse<bool> {
        debug!(%id, "update_profile: called");
        self.request(|reply| StateCommand::UpdateProfile {
            id: id.to_string(),
            profile,
            reply,
        })
        .await
    }

    pub async fn remove_profile(&self, id: &str) -> StateResponse<Option<Profile>> {
        debug!(%id, "remove_profile: called");
        self.request(|reply| StateCommand::RemoveProfile {
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub async fn select_site(&self, site_url: Option<String>) -> StateResponse<()> {
        debug!(?site_url, "select_site: called");
        self.request(|reply| StateCommand::SelectSite { site_url, reply })
            .await
    }

    // === Rate operations ===

    /// Start a rate fetch; returns false if the profile does not exist
    ///
    /// The result arrives later as a `FetchStatusChanged` event.
    pub async fn request_rates(&self, profile_id: &str, site: Site, product: &str) -> StateResponse<bool> {
        debug!(%profile_id, site = %site.url, "request_rates: called");
        self.request(|reply| StateCommand::RequestRates {
            profile_id: profile_id.to_string(),
            site,
            product: product.to_string(),
            reply,
        })
        .await
    }

    pub async fn fetch_status(&self, profile_id: &str, site_url: &str) -> StateResponse<Option<FetchStatus>> {
        debug!(%profile_id, %site_url, "fetch_status: called");
        self.request(|reply| StateCommand::GetFetchStatus {
            profile_id: profile_id.to_string(),
            site_url: site_url.to_string(),
            reply,
        })
        .await
    }

    pub async fn delete_rate(&self, profile_id: &str, site_url: &str, rate_id: &str) -> StateResponse<bool> {
        debug!(%profile_id, %site_url, %rate_id, "delete_rate: called");
        self.request(|reply| StateCommand::DeleteRate {
            profile_id: profile_id.to_string(),
            site_url: site_url.to_string(),
            rate_id: rate_id.to_string(),
            reply,
        })
        .await
    }

    // === Settings ===

    pub async fn settings(&self) -> StateResponse<Settings> {
        debug!("settings: called");
        self.request(|reply| StateCommand::GetSettings { reply }).await
    }

    pub async fn edit_setting(&self, field: &str, value: &str) -> StateResponse<bool> {
        debug!(%field, %value, "edit_setting: called");
        self.request(|reply| StateCommand::EditSetting {
            field: field.to_string(),
            value: value.to_string(),
            reply,
        })
        .await
    }

    pub async fn set_proxies(&self, proxies: Vec<String>) -> StateResponse<()> {
        debug!(count = proxies.len(), "set_proxies: called");
        self.request(|reply| StateCommand::SetProxies { proxies, reply })
            .await
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

/// Drive scheduler ticks into `manager` until it shuts down
pub fn spawn_scheduler(manager: StateManager, config: &SchedulerConfig) -> JoinHandle<()> {
    let period = config.tick();
    debug!(?period, "spawn_scheduler: called");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match manager.tick(Utc::now()).await {
                Ok(started) if !started.is_empty() => info!(count = started.len(), "Scheduler started due tasks"),
                Ok(_) => {}
                Err(_) => {
                    debug!("spawn_scheduler: manager gone, exiting");
                    break;
                }
            }
        }
    })
}

/// Run a rate fetch off the actor and feed the outcome back into it
fn spawn_fetch(port: Arc<dyn AutomationPort>, request: RateRequest, feedback: mpsc::WeakSender<StateCommand>) {
    tokio::spawn(async move {
        let profile_id = request.profile_id.clone();
        let site = request.site.clone();
        let cmd = match port.fetch_shipping_rates(request).await {
            Ok(response) => StateCommand::ApplyFetchResult {
                profile_id,
                site,
                response,
            },
            Err(e) => {
                warn!(%profile_id, site = %site.url, error = %e, "Rate fetch failed");
                StateCommand::FetchFailed {
                    profile_id,
                    site_url: site.url,
                    message: e.to_string(),
                }
            }
        };
        match feedback.upgrade() {
            Some(tx) => {
                let _ = tx.send(cmd).await;
            }
            None => debug!("spawn_fetch: manager gone, dropping result"),
        }
    });
}

async fn actor_loop(
    mut state: StateContainer,
    mut rx: mpsc::Receiver<StateCommand>,
    feedback: mpsc::WeakSender<StateCommand>,
    events: broadcast::Sender<StateEvent>,
) {
    debug!("StateManager actor started");
    let emit = |event: StateEvent| {
        let _ = events.send(event);
    };

    while let Some(cmd) = rx.recv().await {
        match cmd {
            // Task operations
            StateCommand::CreateTasks { spec, amount, reply } => {
                debug!(amount, "actor_loop: CreateTasks command");
                let result = state.create_tasks(&spec, amount, Utc::now()).map_err(StateError::from);
                if result.as_ref().is_ok_and(|t| !t.is_empty()) {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(result);
            }

            StateCommand::GetTask { id, reply } => {
                debug!(%id, "actor_loop: GetTask command");
                let _ = reply.send(state.tasks().get(&id).cloned());
            }

            StateCommand::ListTasks { reply } => {
                debug!("actor_loop: ListTasks command");
                let _ = reply.send(state.tasks().list());
            }

            StateCommand::EditTask { id, edit, reply } => {
                debug!(?id, "actor_loop: EditTask command");
                let result = state.edit_task(id.as_deref(), edit).map_err(StateError::from);
                if matches!(result, Ok(true)) {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(result);
            }

            StateCommand::EditAll { ids, edit, reply } => {
                debug!(count = ids.len(), "actor_loop: EditAll command");
                let result = state.edit_all(&ids, &edit).map_err(StateError::from);
                if result.as_ref().is_ok_and(|n| *n > 0) {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(result);
            }

            StateCommand::DuplicateTask { id, reply } => {
                debug!(%id, "actor_loop: DuplicateTask command");
                let copy = state.duplicate_task(&id);
                if copy.is_some() {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(copy);
            }

            StateCommand::SelectTask { id, range, reply } => {
                debug!(%id, range, "actor_loop: SelectTask command");
                let changed = state.select_task(&id, range);
                if changed {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(changed);
            }

            StateCommand::SelectAll { reply } => {
                debug!("actor_loop: SelectAll command");
                state.select_all();
                emit(StateEvent::TasksChanged);
                let _ = reply.send(());
            }

            StateCommand::ApplyStatus { messages, reply } => {
                debug!(count = messages.len(), "actor_loop: ApplyStatus command");
                let applied = state.apply_status(&messages);
                if applied > 0 {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(applied);
            }

            StateCommand::ClearStoreReference { store_url, reply } => {
                debug!(%store_url, "actor_loop: ClearStoreReference command");
                let cleared = state.clear_store_reference(&store_url);
                if cleared > 0 {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(cleared);
            }

            // Lifecycle operations
            StateCommand::StartTasks { ids, reply } => {
                debug!(count = ids.len(), "actor_loop: StartTasks command");
                let started = state.start(&ids);
                if !started.is_empty() {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(started);
            }

            StateCommand::StartAll { reply } => {
                debug!("actor_loop: StartAll command");
                let started = state.start_all();
                if !started.is_empty() {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(started);
            }

            StateCommand::StopTasks { ids, reply } => {
                debug!(count = ids.len(), "actor_loop: StopTasks command");
                let stopped = state.stop(&ids);
                if !stopped.is_empty() {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(stopped);
            }

            StateCommand::StopAll { reply } => {
                debug!("actor_loop: StopAll command");
                let stopped = state.stop_all();
                if !stopped.is_empty() {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(stopped);
            }

            StateCommand::RemoveTasks { ids, reply } => {
                debug!(count = ids.len(), "actor_loop: RemoveTasks command");
                let removed = state.remove(&ids);
                if !removed.is_empty() {
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(removed);
            }

            StateCommand::Tick { now, reply } => {
                let started = state.tick(now);
                if !started.is_empty() {
                    debug!(count = started.len(), "actor_loop: Tick started tasks");
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(started);
            }

            // Profile operations
            StateCommand::AddProfile { profile, reply } => {
                debug!("actor_loop: AddProfile command");
                let id = state.add_profile(profile);
                emit(StateEvent::ProfilesChanged);
                let _ = reply.send(id);
            }

            StateCommand::GetProfile { id, reply } => {
                debug!(%id, "actor_loop: GetProfile command");
                let _ = reply.send(state.profiles().get(&id).cloned());
            }

            StateCommand::ListProfiles { reply } => {
                debug!("actor_loop: ListProfiles command");
                let _ = reply.send(state.profiles().list());
            }

            StateCommand::UpdateProfile { id, profile, reply } => {
                debug!(%id, "actor_loop: UpdateProfile command");
                let updated = state.update_profile(&id, profile);
                if updated {
                    emit(StateEvent::ProfilesChanged);
                }
                let _ = reply.send(updated);
            }

            StateCommand::RemoveProfile { id, reply } => {
                debug!(%id, "actor_loop: RemoveProfile command");
                let removed = state.remove_profile(&id);
                if removed.is_some() {
                    emit(StateEvent::ProfilesChanged);
                    emit(StateEvent::TasksChanged);
                }
                let _ = reply.send(removed);
            }

            StateCommand::SelectSite { site_url, reply } => {
                debug!(?site_url, "actor_loop: SelectSite command");
                state.select_site(site_url);
                emit(StateEvent::ProfilesChanged);
                let _ = reply.send(());
            }

            // Rate operations
            StateCommand::RequestRates {
                profile_id,
                site,
                product,
                reply,
            } => {
                debug!(%profile_id, site = %site.url, "actor_loop: RequestRates command");
                let site_url = site.url.clone();
                let issued = match state.request_rates(&profile_id, site, product) {
                    Some(request) => {
                        emit(StateEvent::FetchStatusChanged {
                            profile_id: profile_id.clone(),
                            site_url,
                            status: FetchStatus::InProgress,
                        });
                        spawn_fetch(state.port(), request, feedback.clone());
                        true
                    }
                    None => {
                        debug!(%profile_id, "actor_loop: RequestRates unknown profile");
                        false
                    }
                };
                let _ = reply.send(issued);
            }

            StateCommand::GetFetchStatus {
                profile_id,
                site_url,
                reply,
            } => {
                debug!(%profile_id, %site_url, "actor_loop: GetFetchStatus command");
                let _ = reply.send(state.fetch_status(&profile_id, &site_url));
            }

            StateCommand::DeleteRate {
                profile_id,
                site_url,
                rate_id,
                reply,
            } => {
                debug!(%profile_id, %site_url, %rate_id, "actor_loop: DeleteRate command");
                let deleted = state.delete_rate(&profile_id, &site_url, &rate_id);
                if deleted {
                    emit(StateEvent::ProfilesChanged);
                }
                let _ = reply.send(deleted);
            }

            StateCommand::ApplyFetchResult {
                profile_id,
                site,
                response,
            } => {
                debug!(%profile_id, site = %site.url, "actor_loop: ApplyFetchResult command");
                let site_url = site.url.clone();
                match state.apply_fetch_result(&profile_id, site, response) {
                    FetchOutcome::Merged => {
                        emit(StateEvent::ProfilesChanged);
                        emit(StateEvent::FetchStatusChanged {
                            profile_id,
                            site_url,
                            status: FetchStatus::Done,
                        });
                    }
                    FetchOutcome::Incomplete => {
                        warn!(%profile_id, %site_url, "Rate fetch returned no usable rates");
                        emit(StateEvent::FetchStatusChanged {
                            profile_id,
                            site_url,
                            status: FetchStatus::Failed(INCOMPLETE_RESPONSE.to_string()),
                        });
                    }
                    FetchOutcome::Dropped => {}
                }
            }

            StateCommand::FetchFailed {
                profile_id,
                site_url,
                message,
            } => {
                debug!(%profile_id, %site_url, "actor_loop: FetchFailed command");
                if state.fail_fetch(&profile_id, &site_url, &message) {
                    emit(StateEvent::FetchStatusChanged {
                        profile_id,
                        site_url,
                        status: FetchStatus::Failed(message),
                    });
                }
            }

            // Settings
            StateCommand::GetSettings { reply } => {
                debug!("actor_loop: GetSettings command");
                let _ = reply.send(state.settings().clone());
            }

            StateCommand::EditSetting { field, value, reply } => {
                debug!(%field, "actor_loop: EditSetting command");
                let _ = reply.send(state.edit_setting(&field, &value));
            }

            StateCommand::SetProxies { proxies, reply } => {
                debug!(count = proxies.len(), "actor_loop: SetProxies command");
                state.set_proxies(proxies);
                let _ = reply.send(());
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RateQuote, Store, TaskState};
    use crate::lifecycle::{PortError, RateResponse, RecordingPort, StartOptions};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    fn spawn_with(port: Arc<dyn AutomationPort>) -> StateManager {
        let state = StateContainer::new(port, Settings::default(), &SchedulerConfig::default());
        StateManager::spawn(state, 64)
    }

    fn spec() -> TaskSpec {
        TaskSpec::new(Store::new("Kith", "https://kith.com"), "+box")
    }

    fn kith() -> Site {
        Site::new("Kith", "https://kith.com")
    }

    async fn wait_for_fetch(events: &mut broadcast::Receiver<StateEvent>) -> FetchStatus {
        loop {
            let event = timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("timed out waiting for fetch event")
                .expect("event channel closed");
            match event {
                StateEvent::FetchStatusChanged { status, .. } if status != FetchStatus::InProgress => return status,
                _ => continue,
            }
        }
    }

    /// Port whose fetches block until released
    struct GatedPort {
        gate: Notify,
        response: RateResponse,
    }

    #[async_trait::async_trait]
    impl AutomationPort for GatedPort {
        fn register_proxies(&self, _proxies: &[String]) -> Result<(), PortError> {
            Ok(())
        }

        fn start(&self, _tasks: &[Task], _options: &StartOptions) -> Result<(), PortError> {
            Ok(())
        }

        fn stop(&self, _tasks: &[Task]) -> Result<(), PortError> {
            Ok(())
        }

        async fn fetch_shipping_rates(&self, _request: RateRequest) -> Result<RateResponse, PortError> {
            self.gate.notified().await;
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn test_create_start_stop_roundtrip() {
        let port = Arc::new(RecordingPort::new());
        let manager = spawn_with(port.clone());

        let tasks = manager.create_tasks(spec(), 2).await.unwrap();
        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();

        assert_eq!(manager.start_tasks(ids.clone()).await.unwrap(), ids);
        let task = manager.get_task_required(&ids[0]).await.unwrap();
        assert_eq!(task.state, TaskState::Running);

        assert_eq!(manager.stop_all().await.unwrap().len(), 2);
        assert_eq!(port.started().len(), 1);
        assert_eq!(port.stopped().len(), 1);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_with_bad_product_is_rejected() {
        let manager = spawn_with(Arc::new(RecordingPort::new()));
        let mut bad = spec();
        bad.product = "+red *suede".into();

        let result = manager.create_tasks(bad, 3).await;
        assert!(matches!(result, Err(StateError::InvalidProduct(_))));
        assert!(manager.list_tasks().await.unwrap().is_empty());

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_task_required_not_found() {
        let manager = spawn_with(Arc::new(RecordingPort::new()));
        let result = manager.get_task_required("nope").await;
        assert!(matches!(result, Err(StateError::NotFound(_))));
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_tick_starts_due_task() {
        let manager = spawn_with(Arc::new(RecordingPort::new()));
        let now = Utc::now();
        let tasks = manager
            .create_tasks(spec().with_schedule(now - chrono::Duration::seconds(3)), 1)
            .await
            .unwrap();

        let started = manager.tick(now).await.unwrap();
        assert_eq!(started, vec![tasks[0].id.clone()]);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_fetch_success_applies_and_emits() {
        let port = Arc::new(RecordingPort::new());
        let quote = RateQuote::new("Ground", "5.00", "r1");
        port.push_response(Ok(RateResponse {
            rates: vec![quote.clone()],
            selected_rate: Some(quote.clone()),
        }));
        let manager = spawn_with(port);
        let mut events = manager.subscribe_events();

        let pid = manager.add_profile(Profile::new("Main")).await.unwrap();
        assert!(manager.request_rates(&pid, kith(), "+box").await.unwrap());
        assert_eq!(wait_for_fetch(&mut events).await, FetchStatus::Done);

        let profile = manager.get_profile(&pid).await.unwrap().unwrap();
        let group = profile.rate_group("https://kith.com").unwrap();
        assert_eq!(group.selected_rate, Some(quote));
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_fetch_with_no_rates_resolves_as_failed() {
        let port = Arc::new(RecordingPort::new());
        port.push_response(Ok(RateResponse {
            rates: vec![],
            selected_rate: Some(RateQuote::new("Ground", "5.00", "r1")),
        }));
        let manager = spawn_with(port);
        let mut events = manager.subscribe_events();

        let pid = manager.add_profile(Profile::new("Main")).await.unwrap();
        assert!(manager.request_rates(&pid, kith(), "+box").await.unwrap());

        let status = wait_for_fetch(&mut events).await;
        assert_eq!(status, FetchStatus::Failed(INCOMPLETE_RESPONSE.into()));
        assert_eq!(
            manager.fetch_status(&pid, "https://kith.com").await.unwrap(),
            Some(status)
        );
        let profile = manager.get_profile(&pid).await.unwrap().unwrap();
        assert!(profile.rates.is_empty());
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_fetch_failure_sets_failed_status() {
        let port = Arc::new(RecordingPort::new());
        port.push_response(Err(PortError::FetchFailed("blocked".into())));
        let manager = spawn_with(port);
        let mut events = manager.subscribe_events();

        let pid = manager.add_profile(Profile::new("Main")).await.unwrap();
        manager.request_rates(&pid, kith(), "+box").await.unwrap();

        let status = wait_for_fetch(&mut events).await;
        assert!(matches!(status, FetchStatus::Failed(ref m) if m.contains("blocked")));
        assert_eq!(
            manager.fetch_status(&pid, "https://kith.com").await.unwrap(),
            Some(status)
        );
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_request_rates_for_unknown_profile() {
        let manager = spawn_with(Arc::new(RecordingPort::new()));
        assert!(!manager.request_rates("ghost", kith(), "+box").await.unwrap());
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_for_deleted_profile_is_dropped() {
        let quote = RateQuote::new("Ground", "5.00", "r1");
        let port = Arc::new(GatedPort {
            gate: Notify::new(),
            response: RateResponse {
                rates: vec![quote.clone()],
                selected_rate: Some(quote),
            },
        });
        let manager = spawn_with(port.clone());

        let pid = manager.add_profile(Profile::new("Main")).await.unwrap();
        manager.request_rates(&pid, kith(), "+box").await.unwrap();
        manager.remove_profile(&pid).await.unwrap();

        port.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(manager.list_profiles().await.unwrap().is_empty());
        assert_eq!(manager.fetch_status(&pid, "https://kith.com").await.unwrap(), None);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_settings_flow_into_start() {
        let port = Arc::new(RecordingPort::new());
        let manager = spawn_with(port.clone());
        assert!(manager.edit_setting("error-delay", "750").await.unwrap());
        assert!(!manager.edit_setting("error-delay", "soon").await.unwrap());
        manager.set_proxies(vec!["1.1.1.1:3128".into()]).await.unwrap();

        manager.create_tasks(spec(), 1).await.unwrap();
        manager.start_all().await.unwrap();

        let settings = manager.settings().await.unwrap();
        assert_eq!(settings.error_delay, 750);
        let calls = port.calls();
        assert!(calls.contains(&crate::lifecycle::PortCall::RegisterProxies(vec!["1.1.1.1:3128".into()])));
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_stops_after_shutdown() {
        let manager = spawn_with(Arc::new(RecordingPort::new()));
        let config = SchedulerConfig {
            tick_ms: 10,
            ..Default::default()
        };
        let handle = spawn_scheduler(manager.clone(), &config);
        manager.shutdown().await.unwrap();
        timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not exit")
            .unwrap();
    }
}
