//! Task domain type
//!
//! A Task is one managed purchase attempt against a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::product::ProductDescriptor;

/// Run state of a task
///
/// There is no scheduled state: a task is "scheduled" when it has a
/// `schedule` and is not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Checkout strategy variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Shopify,
    Supreme,
}

impl Platform {
    /// Infer the platform from a store url
    pub fn for_store_url(url: &str) -> Self {
        if url.to_lowercase().contains("supreme") {
            Self::Supreme
        } else {
            Self::Shopify
        }
    }
}

/// Target site of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Store {
    pub name: String,
    pub url: String,
    /// Storefront password, if the store is locked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Store {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            password: None,
        }
    }
}

/// Input for creating tasks; `product` is still raw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskSpec {
    pub store: Option<Store>,
    pub platform: Platform,
    pub product: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub schedule: Option<DateTime<Utc>>,
    /// Supreme only
    #[serde(default)]
    pub variation: Option<String>,
    /// Supreme only
    #[serde(default)]
    pub category: Option<String>,
    /// Supreme only (milliseconds)
    #[serde(default)]
    pub checkout_delay: Option<u64>,
    /// Shopify only
    #[serde(default)]
    pub account: Option<String>,
}

impl TaskSpec {
    pub fn new(store: Store, product: impl Into<String>) -> Self {
        let platform = Platform::for_store_url(&store.url);
        Self {
            store: Some(store),
            platform,
            product: product.into(),
            ..Default::default()
        }
    }

    pub fn with_schedule(mut self, at: DateTime<Utc>) -> Self {
        self.schedule = Some(at);
        self
    }

    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.profile = Some(profile_id.into());
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }
}

/// A managed purchase task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique id, immutable after creation
    pub id: String,
    pub store: Option<Store>,
    pub platform: Platform,
    pub product: ProductDescriptor,
    pub size: String,
    /// Profile id reference, cleared when the profile is deleted
    pub profile: Option<String>,
    /// Absent means "start manually only"
    pub schedule: Option<DateTime<Utc>>,
    pub state: TaskState,
    /// Human-readable status, last writer wins
    pub message: String,
    pub variation: Option<String>,
    pub category: Option<String>,
    pub checkout_delay: Option<u64>,
    pub account: Option<String>,

    // Transient UI selection, not part of identity
    #[serde(skip)]
    pub selected: bool,
    #[serde(skip)]
    pub last_selected: bool,
}

impl Task {
    /// Build a stopped task from a spec and an already-parsed product
    ///
    /// Fields that do not apply to the chosen platform are dropped.
    pub fn from_spec(id: String, spec: &TaskSpec, product: ProductDescriptor) -> Self {
        debug!(%id, platform = ?spec.platform, "Task::from_spec: called");
        let mut task = Self {
            id,
            store: spec.store.clone(),
            platform: spec.platform,
            product,
            size: spec.size.clone(),
            profile: spec.profile.clone(),
            schedule: spec.schedule,
            state: TaskState::Stopped,
            message: String::new(),
            variation: spec.variation.clone(),
            category: spec.category.clone(),
            checkout_delay: spec.checkout_delay,
            account: spec.account.clone(),
            selected: false,
            last_selected: false,
        };
        task.strip_platform_fields();
        task
    }

    /// Drop fields that only mean something on the other platform
    pub fn strip_platform_fields(&mut self) {
        match self.platform {
            Platform::Shopify => {
                debug!(id = %self.id, "Task::strip_platform_fields: Shopify branch");
                self.variation = None;
                self.category = None;
                self.checkout_delay = None;
            }
            Platform::Supreme => {
                debug!(id = %self.id, "Task::strip_platform_fields: Supreme branch");
                self.account = None;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }
}
