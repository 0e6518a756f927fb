//! RAII lock guard implementation.

use super::context::LockContext;
use super::manager::ClusterLockManager;
use super::types::LockResult;
use crate::error::Result;

/// RAII guard for a cluster lock.
///
/// When dropped, the lock is unlocked for the guard's context. If unlocking
/// fails (for example because the manager was stopped meanwhile), a warning
/// is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard {
    manager: ClusterLockManager,
    name: String,
    context: LockContext,
    result: LockResult,

    /// Whether the lock has been released manually.
    released: bool,
}

impl LockGuard {
    pub(super) fn new(
        manager: ClusterLockManager,
        name: String,
        context: LockContext,
        result: LockResult,
    ) -> Self {
        Self {
            manager,
            name,
            context,
            result,
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> LockContext {
        self.context
    }

    /// How the lock was obtained.
    pub fn result(&self) -> LockResult {
        self.result
    }

    /// Manually release the lock, surfacing any error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.manager.unlock(&self.name, self.context)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.manager.unlock(&self.name, self.context)
        {
            tracing::warn!(
                lock = %self.name,
                context = %self.context,
                error = %e,
                "failed to release lock on drop"
            );
        }
    }
}
