//! TaskCore - scheduled purchase-task lifecycle engine
//!
//! TaskCore keeps a collection of purchase tasks, starts them when their
//! scheduled time comes due, drives their Stopped/Running lifecycle through
//! an external automation worker, and merges asynchronously fetched
//! shipping-rate quotes into per-profile caches.
//!
//! # Core Concepts
//!
//! - **Single Owner**: all state lives in one container behind an actor
//! - **Ordered Transitions**: commands apply one at a time, in arrival order
//! - **Bounded Due Window**: missed schedules are never fired late
//! - **Last Applied Wins**: rate merges read the profile at apply time
//!
//! # Modules
//!
//! - [`domain`] - Task, Profile, product descriptors and id allocation
//! - [`tasks`] - Task collection, edits and selection
//! - [`scheduler`] - Due-set computation
//! - [`lifecycle`] - Start/stop/remove through the automation port
//! - [`rates`] - Shipping-rate reconciliation
//! - [`state`] - State container and actor
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod rates;
pub mod scheduler;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use domain::{ProductDescriptor, Profile, Task, TaskSpec};
pub use state::{StateContainer, StateManager};
