//! TaskStore - the authoritative in-memory task collection
//!
//! Tasks are kept in insertion order (row order for range selection) and
//! indexed by id. Every mutation here is synchronous and atomic; lifecycle
//! side effects (talking to the automation port) live in the controller.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::domain::{IdAllocator, IdSource, Platform, ProductDescriptor, ProductParseError, ShortIds, Task, TaskSpec};

use super::edit::{BulkEdit, TaskEdit};

/// In-memory collection of tasks keyed by id
pub struct TaskStore {
    tasks: IndexMap<String, Task>,
    ids: IdAllocator<Box<dyn IdSource + Send>>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::with_id_source(Box::new(ShortIds::default()))
    }

    /// Use a specific id source (tests inject colliding sources)
    pub fn with_id_source(source: Box<dyn IdSource + Send>) -> Self {
        Self {
            tasks: IndexMap::new(),
            ids: IdAllocator::with_source(source),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Tasks in row order
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Snapshot of all tasks in row order
    pub fn list(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.tasks.values().filter(|t| t.selected).map(|t| t.id.clone()).collect()
    }

    /// Create `amount` copies of the task described by `spec`
    ///
    /// The product is parsed first; if it is rejected nothing is created.
    /// An amount of zero creates nothing.
    pub fn create(&mut self, spec: &TaskSpec, amount: u32, now: DateTime<Utc>) -> Result<Vec<Task>, ProductParseError> {
        debug!(product = %spec.product, amount, "TaskStore::create: called");
        let product = ProductDescriptor::parse(&spec.product)?;

        let mut template = Task::from_spec(String::new(), spec, product);
        if let Some(at) = spec.schedule.filter(|at| *at > now) {
            debug!(%at, "TaskStore::create: schedule in the future, setting message");
            template.message = scheduled_message(at);
        }

        let mut created = Vec::with_capacity(amount as usize);
        for _ in 0..amount {
            let tasks = &self.tasks;
            let id = self.ids.allocate(|id| tasks.contains_key(id));
            let mut task = template.clone();
            task.id = id.clone();
            self.tasks.insert(id, task.clone());
            created.push(task);
        }

        info!(count = created.len(), "Created tasks");
        Ok(created)
    }

    /// Apply a field edit to one task
    ///
    /// Returns Ok(false) when there is nothing to edit: no id, an unknown id,
    /// or a field the task's platform does not carry. A product that fails to
    /// parse is an error and leaves the task untouched.
    pub fn edit(&mut self, id: Option<&str>, edit: TaskEdit) -> Result<bool, ProductParseError> {
        debug!(?id, ?edit, "TaskStore::edit: called");
        let Some(id) = id else {
            debug!("TaskStore::edit: no id, ignoring");
            return Ok(false);
        };
        let Some(task) = self.tasks.get_mut(id) else {
            debug!(%id, "TaskStore::edit: unknown id, ignoring");
            return Ok(false);
        };
        if !platform_carries(task.platform, &edit) {
            debug!(%id, platform = ?task.platform, "TaskStore::edit: field not used by platform, ignoring");
            return Ok(false);
        }

        match edit {
            TaskEdit::Product(raw) => task.product = ProductDescriptor::parse(&raw)?,
            TaskEdit::Store(store) => {
                if let Some(store) = &store {
                    task.platform = Platform::for_store_url(&store.url);
                }
                task.store = store;
            }
            TaskEdit::Size(size) => task.size = size,
            TaskEdit::Profile(profile) => task.profile = profile,
            TaskEdit::Schedule(schedule) => task.schedule = schedule,
            TaskEdit::Account(account) => task.account = account,
            TaskEdit::Category(category) => task.category = category,
            TaskEdit::Variation(variation) => task.variation = variation,
            TaskEdit::CheckoutDelay(delay) => task.checkout_delay = Some(delay),
        }
        task.strip_platform_fields();
        Ok(true)
    }

    /// Apply one edit to many tasks; returns how many were changed
    pub fn edit_all(&mut self, ids: &[String], edit: &BulkEdit) -> Result<usize, ProductParseError> {
        debug!(count = ids.len(), ?edit, "TaskStore::edit_all: called");
        let product = match edit {
            BulkEdit::ProductUrl(url) => Some(ProductDescriptor::parse(url)?),
            BulkEdit::StorePassword(_) => None,
        };

        let mut changed = 0;
        for id in ids {
            let Some(task) = self.tasks.get_mut(id) else {
                debug!(%id, "TaskStore::edit_all: unknown id, skipping");
                continue;
            };
            match (edit, &product) {
                (BulkEdit::ProductUrl(_), Some(product)) => {
                    task.product = product.clone();
                    changed += 1;
                }
                (BulkEdit::StorePassword(password), _) => {
                    if let Some(store) = task.store.as_mut() {
                        store.password = Some(password.clone());
                        changed += 1;
                    }
                }
                _ => {}
            }
        }
        Ok(changed)
    }

    /// Insert a copy of a task under a fresh id, stopped and unselected
    pub fn duplicate(&mut self, id: &str) -> Option<Task> {
        debug!(%id, "TaskStore::duplicate: called");
        let mut copy = self.tasks.get(id)?.clone();
        let tasks = &self.tasks;
        copy.id = self.ids.allocate(|id| tasks.contains_key(id));
        copy.state = crate::domain::TaskState::Stopped;
        copy.message.clear();
        copy.selected = false;
        copy.last_selected = false;
        self.tasks.insert(copy.id.clone(), copy.clone());
        Some(copy)
    }

    /// Remove one task, keeping row order of the rest
    pub fn remove(&mut self, id: &str) -> Option<Task> {
        debug!(%id, "TaskStore::remove: called");
        self.tasks.shift_remove(id)
    }

    /// Remove every listed task that exists
    pub fn remove_all(&mut self, ids: &[String]) -> Vec<Task> {
        debug!(count = ids.len(), "TaskStore::remove_all: called");
        ids.iter().filter_map(|id| self.tasks.shift_remove(id)).collect()
    }

    /// Toggle selection of a task, optionally as a range from the last selected row
    ///
    /// A plain toggle flips one task and makes it the anchor. A range toggle
    /// covers every row between the anchor and the clicked task: if any of
    /// them is unselected the whole range becomes selected, otherwise the
    /// whole range is deselected.
    pub fn select(&mut self, id: &str, range: bool) -> bool {
        debug!(%id, range, "TaskStore::select: called");
        let Some(clicked) = self.tasks.get_index_of(id) else {
            debug!(%id, "TaskStore::select: unknown id");
            return false;
        };
        let anchor = self.tasks.values().position(|t| t.last_selected);

        match anchor.filter(|_| range) {
            Some(anchor) => {
                let (lo, hi) = if anchor <= clicked { (anchor, clicked) } else { (clicked, anchor) };
                let any_unselected = (lo..=hi).any(|i| !self.tasks[i].selected);
                debug!(lo, hi, any_unselected, "TaskStore::select: range branch");
                for i in lo..=hi {
                    let task = &mut self.tasks[i];
                    task.selected = if any_unselected { true } else { !task.selected };
                }
            }
            None => {
                debug!("TaskStore::select: single branch");
                let task = &mut self.tasks[clicked];
                task.selected = !task.selected;
            }
        }

        for (i, task) in self.tasks.values_mut().enumerate() {
            task.last_selected = i == clicked;
        }
        true
    }

    /// Select everything, or clear everything if all were already selected
    pub fn select_all(&mut self) {
        let any_unselected = self.tasks.values().any(|t| !t.selected);
        debug!(any_unselected, "TaskStore::select_all: called");
        for task in self.tasks.values_mut() {
            task.selected = if any_unselected { true } else { !task.selected };
        }
    }

    /// Apply worker status messages; unknown ids are skipped
    pub fn apply_status(&mut self, messages: &HashMap<String, String>) -> usize {
        debug!(count = messages.len(), "TaskStore::apply_status: called");
        let mut applied = 0;
        for (id, message) in messages {
            if let Some(task) = self.tasks.get_mut(id) {
                task.message = message.clone();
                applied += 1;
            }
        }
        applied
    }

    /// Clear the profile reference of every task using a deleted profile
    pub fn clear_profile_reference(&mut self, profile_id: &str) -> usize {
        debug!(%profile_id, "TaskStore::clear_profile_reference: called");
        let mut cleared = 0;
        for task in self.tasks.values_mut() {
            if task.profile.as_deref() == Some(profile_id) {
                task.profile = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Clear the store reference of every task targeting a deleted store
    pub fn clear_store_reference(&mut self, store_url: &str) -> usize {
        debug!(%store_url, "TaskStore::clear_store_reference: called");
        let mut cleared = 0;
        for task in self.tasks.values_mut() {
            if task.store.as_ref().is_some_and(|s| s.url == store_url) {
                task.store = None;
                cleared += 1;
            }
        }
        cleared
    }
}

fn scheduled_message(at: DateTime<Utc>) -> String {
    format!("Scheduled for {}", at.format("%Y-%m-%d %H:%M:%S UTC"))
}

/// Whether an edit targets a field that survives platform stripping
fn platform_carries(platform: Platform, edit: &TaskEdit) -> bool {
    !matches!(
        (platform, edit),
        (
            Platform::Shopify,
            TaskEdit::Category(_) | TaskEdit::Variation(_) | TaskEdit::CheckoutDelay(_)
        ) | (Platform::Supreme, TaskEdit::Account(_))
    )
}
