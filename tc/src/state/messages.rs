//! State manager messages
//!
//! Commands and responses for the actor pattern.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{ProductParseError, Profile, Site, Task, TaskSpec};
use crate::lifecycle::RateResponse;
use crate::rates::FetchStatus;
use crate::tasks::{BulkEdit, TaskEdit};

use super::container::Settings;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid product: {0}")]
    InvalidProduct(#[from] ProductParseError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Event broadcast after a transition changed something
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// Task list or any task field changed
    TasksChanged,
    /// A profile or one of its rate groups changed
    ProfilesChanged,
    /// A rate fetch moved to a new status
    FetchStatusChanged {
        profile_id: String,
        site_url: String,
        status: FetchStatus,
    },
}

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Task operations
    CreateTasks {
        spec: TaskSpec,
        amount: u32,
        reply: oneshot::Sender<StateResponse<Vec<Task>>>,
    },
    GetTask {
        id: String,
        reply: oneshot::Sender<Option<Task>>,
    },
    ListTasks {
        reply: oneshot::Sender<Vec<Task>>,
    },
    EditTask {
        id: Option<String>,
        edit: TaskEdit,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    EditAll {
        ids: Vec<String>,
        edit: BulkEdit,
        reply: oneshot::Sender<StateResponse<usize>>,
    },
    DuplicateTask {
        id: String,
        reply: oneshot::Sender<Option<Task>>,
    },
    SelectTask {
        id: String,
        range: bool,
        reply: oneshot::Sender<bool>,
    },
    SelectAll {
        reply: oneshot::Sender<()>,
    },
    ApplyStatus {
        messages: HashMap<String, String>,
        reply: oneshot::Sender<usize>,
    },
    ClearStoreReference {
        store_url: String,
        reply: oneshot::Sender<usize>,
    },

    // Lifecycle operations
    StartTasks {
        ids: Vec<String>,
        reply: oneshot::Sender<Vec<String>>,
    },
    StartAll {
        reply: oneshot::Sender<Vec<String>>,
    },
    StopTasks {
        ids: Vec<String>,
        reply: oneshot::Sender<Vec<String>>,
    },
    StopAll {
        reply: oneshot::Sender<Vec<String>>,
    },
    RemoveTasks {
        ids: Vec<String>,
        reply: oneshot::Sender<Vec<Task>>,
    },

    // Scheduler
    Tick {
        now: DateTime<Utc>,
        reply: oneshot::Sender<Vec<String>>,
    },

    // Profile operations
    AddProfile {
        profile: Profile,
        reply: oneshot::Sender<String>,
    },
    GetProfile {
        id: String,
        reply: oneshot::Sender<Option<Profile>>,
    },
    ListProfiles {
        reply: oneshot::Sender<Vec<Profile>>,
    },
    UpdateProfile {
        id: String,
        profile: Profile,
        reply: oneshot::Sender<bool>,
    },
    RemoveProfile {
        id: String,
        reply: oneshot::Sender<Option<Profile>>,
    },
    SelectSite {
        site_url: Option<String>,
        reply: oneshot::Sender<()>,
    },

    // Rate operations
    RequestRates {
        profile_id: String,
        site: Site,
        product: String,
        reply: oneshot::Sender<bool>,
    },
    GetFetchStatus {
        profile_id: String,
        site_url: String,
        reply: oneshot::Sender<Option<FetchStatus>>,
    },
    DeleteRate {
        profile_id: String,
        site_url: String,
        rate_id: String,
        reply: oneshot::Sender<bool>,
    },
    /// Fed back by the actor's own fetch tasks
    ApplyFetchResult {
        profile_id: String,
        site: Site,
        response: RateResponse,
    },
    /// Fed back by the actor's own fetch tasks
    FetchFailed {
        profile_id: String,
        site_url: String,
        message: String,
    },

    // Settings
    GetSettings {
        reply: oneshot::Sender<Settings>,
    },
    EditSetting {
        field: String,
        value: String,
        reply: oneshot::Sender<bool>,
    },
    SetProxies {
        proxies: Vec<String>,
        reply: oneshot::Sender<()>,
    },

    // Shutdown
    Shutdown,
}
