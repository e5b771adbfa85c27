//! Task collection and field edits

mod edit;
mod store;

pub use edit::{BulkEdit, TaskEdit};
pub use store::TaskStore;
