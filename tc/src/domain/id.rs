//! Identifier allocation
//!
//! Task ids are short random alphanumeric strings, profile ids are UUIDs.
//! Every allocation is checked against the caller's *current* id set and
//! retried until it does not collide.

use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::debug;

/// Length of generated task ids
pub const SHORT_ID_LEN: usize = 10;

/// Source of candidate identifiers
pub trait IdSource {
    /// Produce the next candidate id (may collide, the allocator retries)
    fn next_id(&mut self) -> String;
}

impl<S: IdSource + ?Sized> IdSource for Box<S> {
    fn next_id(&mut self) -> String {
        (**self).next_id()
    }
}

/// Random alphanumeric ids, used for tasks
#[derive(Debug, Clone)]
pub struct ShortIds {
    len: usize,
}

impl ShortIds {
    pub fn new(len: usize) -> Self {
        Self { len: len.max(1) }
    }
}

impl Default for ShortIds {
    fn default() -> Self {
        Self::new(SHORT_ID_LEN)
    }
}

impl IdSource for ShortIds {
    fn next_id(&mut self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect()
    }
}

/// Time-ordered UUIDs, used for profiles
#[derive(Debug, Clone, Default)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn next_id(&mut self) -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

/// Allocates ids that are free in a given collection
#[derive(Debug, Clone, Default)]
pub struct IdAllocator<S = ShortIds> {
    source: S,
}

impl IdAllocator<ShortIds> {
    /// Allocator for task ids
    pub fn short() -> Self {
        Self::with_source(ShortIds::default())
    }
}

impl IdAllocator<UuidIds> {
    /// Allocator for profile ids
    pub fn uuid() -> Self {
        Self::with_source(UuidIds)
    }
}

impl<S: IdSource> IdAllocator<S> {
    pub fn with_source(source: S) -> Self {
        Self { source }
    }

    /// Generate ids until one is not taken
    ///
    /// `is_taken` must read the collection as it is now, including ids handed
    /// out earlier in the same transition. There is no error path.
    pub fn allocate<F>(&mut self, is_taken: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        let mut attempts = 0u32;
        loop {
            let id = self.source.next_id();
            attempts += 1;
            if !is_taken(&id) {
                debug!(%id, attempts, "IdAllocator::allocate: allocated");
                return id;
            }
            debug!(%id, attempts, "IdAllocator::allocate: collision, retrying");
        }
    }
}
