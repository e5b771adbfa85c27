//! State management with actor pattern
//!
//! StateManager owns the StateContainer and processes commands via channels,
//! so every transition runs alone and in arrival order.

mod container;
mod manager;
mod messages;

pub use container::{Settings, StateContainer};
pub use manager::{StateManager, spawn_scheduler};
pub use messages::{StateCommand, StateError, StateEvent, StateResponse};
