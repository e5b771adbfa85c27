//! Domain types for TaskCore
//!
//! Core domain types: Task, Profile, RateGroup, and the product descriptor,
//! plus id allocation shared by the task and profile collections.

mod id;
mod product;
mod profile;
mod task;

pub use id::{IdAllocator, IdSource, SHORT_ID_LEN, ShortIds, UuidIds};
pub use product::{ProductDescriptor, ProductParseError};
pub use profile::{Location, Payment, Profile, RateGroup, RateQuote, Site};
pub use task::{Platform, Store, Task, TaskSpec, TaskState};
