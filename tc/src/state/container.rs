//! StateContainer - single owner of tasks, profiles and settings
//!
//! Each public method is one atomic transition. The actor in `manager`
//! calls these strictly in command order; nothing else mutates the
//! collections.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AutomationConfig;
use crate::domain::{Profile, ProductParseError, Site, Task, TaskSpec};
use crate::lifecycle::{AutomationPort, Delays, LifecycleController, RateRequest, RateResponse};
use crate::rates::{FetchOutcome, FetchStatus, ProfileRateCache};
use crate::scheduler::{SchedulerConfig, due_set};
use crate::tasks::{BulkEdit, TaskEdit, TaskStore};

/// Worker settings passed along with every start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Settings {
    pub monitor_delay: u64,
    pub error_delay: u64,
    pub proxies: Vec<String>,
}

impl Settings {
    pub fn delays(&self) -> Delays {
        Delays {
            monitor_ms: self.monitor_delay,
            error_ms: self.error_delay,
        }
    }

    /// Edit a delay from user input
    ///
    /// Empty input means 0. Anything that is not an integer leaves the
    /// setting alone, as does an unknown field.
    pub fn edit(&mut self, field: &str, value: &str) -> bool {
        debug!(%field, %value, "Settings::edit: called");
        let value = value.trim();
        let parsed = if value.is_empty() {
            0
        } else {
            match value.parse::<u64>() {
                Ok(v) => v,
                Err(_) => {
                    debug!("Settings::edit: not an integer, ignoring");
                    return false;
                }
            }
        };
        match field {
            "monitor-delay" => self.monitor_delay = parsed,
            "error-delay" => self.error_delay = parsed,
            _ => {
                debug!(%field, "Settings::edit: unknown field");
                return false;
            }
        }
        true
    }
}

impl From<&AutomationConfig> for Settings {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            monitor_delay: config.monitor_delay_ms,
            error_delay: config.error_delay_ms,
            proxies: config.proxies.clone(),
        }
    }
}

/// Owner of all mutable core state
pub struct StateContainer {
    tasks: TaskStore,
    profiles: ProfileRateCache,
    settings: Settings,
    lifecycle: LifecycleController,
    due_window: chrono::Duration,
}

impl StateContainer {
    pub fn new(port: Arc<dyn AutomationPort>, settings: Settings, scheduler: &SchedulerConfig) -> Self {
        Self::with_parts(TaskStore::new(), ProfileRateCache::new(), port, settings, scheduler)
    }

    /// Build from pre-made collections (tests inject id sources this way)
    pub fn with_parts(
        tasks: TaskStore,
        profiles: ProfileRateCache,
        port: Arc<dyn AutomationPort>,
        settings: Settings,
        scheduler: &SchedulerConfig,
    ) -> Self {
        Self {
            tasks,
            profiles,
            settings,
            lifecycle: LifecycleController::new(port),
            due_window: scheduler.due_window(),
        }
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn profiles(&self) -> &ProfileRateCache {
        &self.profiles
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn port(&self) -> Arc<dyn AutomationPort> {
        self.lifecycle.port()
    }

    // === Tasks ===

    pub fn create_tasks(&mut self, spec: &TaskSpec, amount: u32, now: DateTime<Utc>) -> Result<Vec<Task>, ProductParseError> {
        self.lifecycle.create(&mut self.tasks, spec, amount, now)
    }

    pub fn edit_task(&mut self, id: Option<&str>, edit: TaskEdit) -> Result<bool, ProductParseError> {
        self.tasks.edit(id, edit)
    }

    pub fn edit_all(&mut self, ids: &[String], edit: &BulkEdit) -> Result<usize, ProductParseError> {
        self.tasks.edit_all(ids, edit)
    }

    pub fn duplicate_task(&mut self, id: &str) -> Option<Task> {
        self.lifecycle.duplicate(&mut self.tasks, id)
    }

    pub fn select_task(&mut self, id: &str, range: bool) -> bool {
        self.tasks.select(id, range)
    }

    pub fn select_all(&mut self) {
        self.tasks.select_all();
    }

    pub fn apply_status(&mut self, messages: &HashMap<String, String>) -> usize {
        self.tasks.apply_status(messages)
    }

    pub fn clear_store_reference(&mut self, store_url: &str) -> usize {
        self.tasks.clear_store_reference(store_url)
    }

    // === Lifecycle ===

    pub fn start(&mut self, ids: &[String]) -> Vec<String> {
        let delays = self.settings.delays();
        self.lifecycle.start(&mut self.tasks, ids, delays, &self.settings.proxies)
    }

    pub fn start_all(&mut self) -> Vec<String> {
        let ids = self.all_task_ids();
        self.start(&ids)
    }

    pub fn stop(&mut self, ids: &[String]) -> Vec<String> {
        self.lifecycle.stop(&mut self.tasks, ids)
    }

    pub fn stop_all(&mut self) -> Vec<String> {
        let ids = self.all_task_ids();
        self.stop(&ids)
    }

    pub fn remove(&mut self, ids: &[String]) -> Vec<Task> {
        self.lifecycle.remove(&mut self.tasks, ids)
    }

    /// Start whatever is due at `now`
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let due = due_set(self.tasks.iter(), now, self.due_window);
        if due.is_empty() {
            return due;
        }
        debug!(count = due.len(), "StateContainer::tick: starting due tasks");
        self.start(&due)
    }

    // === Profiles ===

    pub fn add_profile(&mut self, profile: Profile) -> String {
        self.profiles.add_profile(profile)
    }

    pub fn update_profile(&mut self, id: &str, profile: Profile) -> bool {
        self.profiles.update_profile(id, profile)
    }

    /// Delete a profile and clear it from every task that used it
    pub fn remove_profile(&mut self, id: &str) -> Option<Profile> {
        let removed = self.profiles.remove_profile(id)?;
        let cleared = self.tasks.clear_profile_reference(id);
        debug!(%id, cleared, "StateContainer::remove_profile: cleared task references");
        Some(removed)
    }

    pub fn select_site(&mut self, site_url: Option<String>) {
        self.profiles.select_site(site_url);
    }

    // === Rates ===

    /// Mark a fetch in flight and build the request to send
    ///
    /// None if the profile does not exist.
    pub fn request_rates(&mut self, profile_id: &str, site: Site, product: String) -> Option<RateRequest> {
        debug!(%profile_id, site = %site.url, "StateContainer::request_rates: called");
        if !self.profiles.begin_fetch(profile_id, &site.url) {
            return None;
        }
        Some(RateRequest {
            profile_id: profile_id.to_string(),
            site,
            product,
        })
    }

    pub fn apply_fetch_result(&mut self, profile_id: &str, site: Site, response: RateResponse) -> FetchOutcome {
        self.profiles
            .apply_fetch_result(profile_id, site, response.rates, response.selected_rate)
    }

    pub fn fail_fetch(&mut self, profile_id: &str, site_url: &str, message: &str) -> bool {
        self.profiles.fail_fetch(profile_id, site_url, message)
    }

    pub fn fetch_status(&self, profile_id: &str, site_url: &str) -> Option<FetchStatus> {
        self.profiles.fetch_status(profile_id, site_url).cloned()
    }

    pub fn delete_rate(&mut self, profile_id: &str, site_url: &str, rate_id: &str) -> bool {
        self.profiles.delete_rate(profile_id, site_url, rate_id)
    }

    // === Settings ===

    pub fn edit_setting(&mut self, field: &str, value: &str) -> bool {
        self.settings.edit(field, value)
    }

    pub fn set_proxies(&mut self, proxies: Vec<String>) {
        debug!(count = proxies.len(), "StateContainer::set_proxies: called");
        self.settings.proxies = proxies;
    }

    fn all_task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }
}
