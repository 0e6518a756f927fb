//! Execution-context handles used as re-entrancy keys.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identifies the caller of a lock operation.
///
/// Hold counts are kept per `(lock name, context)`. A thread, task or request
/// that wants re-entrant behavior creates one context and passes it to every
/// `lock`/`unlock` call. Contexts are cheap, `Copy`, and unique within the
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockContext(u64);

impl LockContext {
    pub fn new() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for LockContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}
