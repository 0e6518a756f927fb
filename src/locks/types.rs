//! Lock result and information structures.

use crate::node::ClusterNode;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a successful `lock` call obtained the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockResult {
    /// This member won an acquisition round against the cluster.
    AcquiredFromCluster,
    /// The lock was already owned by this member (re-entrant or shared local hold).
    AlreadyHeld,
    /// The name had never been seen and was taken without a cluster round.
    NewLock,
}

impl LockResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockResult::AcquiredFromCluster => "acquired_from_cluster",
            LockResult::AlreadyHeld => "already_held",
            LockResult::NewLock => "new_lock",
        }
    }
}

impl std::fmt::Display for LockResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one lock as seen by the local member.
#[derive(Debug, Clone, Serialize)]
pub struct LockInfo {
    pub name: String,

    /// Member believed to own the lock.
    pub owner: Option<ClusterNode>,

    /// Sum of local re-entrancy counts.
    pub local_holds: u32,

    /// Number of local contexts currently holding.
    pub local_contexts: usize,

    /// Requesters waiting here (local and remote).
    pub queued: usize,

    pub remote_waiters: usize,

    /// Requester holding our provisional grant.
    pub pending_grant: Option<ClusterNode>,

    pub generation: u64,

    pub acquired_at: Option<DateTime<Utc>>,
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let owner = self
            .owner
            .as_ref()
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} (owner: {}, holds: {}, queued: {}, generation: {})",
            self.name, owner, self.local_holds, self.queued, self.generation
        )
    }
}
