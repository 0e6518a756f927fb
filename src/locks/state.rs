//! Per-lock bookkeeping.
//!
//! Every member keeps one [`LockState`] per lock name it has seen. The state
//! records who this member believes owns the lock, who is waiting for it here,
//! how often each local context holds it, and any provisional grant this
//! member has handed to a competing requester.

use super::context::LockContext;
use super::types::LockInfo;
use crate::node::ClusterNode;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// A queued request for a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    /// A caller on this member.
    Local { context: LockContext, ticket: u64 },
    /// Another member whose acquire request is parked here until we yield.
    Remote { node: ClusterNode, ticket: u64 },
}

impl Requester {
    pub fn ticket(&self) -> u64 {
        match self {
            Requester::Local { ticket, .. } | Requester::Remote { ticket, .. } => *ticket,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Requester::Remote { .. })
    }
}

/// "No objection" this member gave to a requester, valid until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGrant {
    pub node: ClusterNode,
    pub expires_at: Instant,
}

#[derive(Debug)]
pub struct LockState {
    pub name: String,

    /// Member believed to hold the lock cluster-wide.
    pub owner: Option<ClusterNode>,

    /// Waiting requesters, oldest first.
    pub queue: VecDeque<Requester>,

    /// Re-entrancy counts of local contexts sharing local ownership.
    pub holds: HashMap<LockContext, u32>,

    pub pending_grant: Option<PendingGrant>,

    /// A local context is running an acquisition round.
    pub requesting: bool,

    /// Lost rounds since the last successful acquisition.
    pub attempts: u32,

    /// Earliest time the next local round may start.
    pub retry_at: Option<Instant>,

    /// Bumped on every ownership change.
    pub generation: u64,

    /// Drop the entry from the registry once it is idle.
    pub removable: bool,

    /// The entry was evicted from the registry; callers must fetch a new one.
    pub invalid: bool,

    pub acquired_at: Option<DateTime<Utc>>,

    next_ticket: u64,
}

impl LockState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            queue: VecDeque::new(),
            holds: HashMap::new(),
            pending_grant: None,
            requesting: false,
            attempts: 0,
            retry_at: None,
            generation: 0,
            removable: false,
            invalid: false,
            acquired_at: None,
            next_ticket: 1,
        }
    }

    pub fn is_owned_by(&self, node: &ClusterNode) -> bool {
        self.owner.as_ref() == Some(node)
    }

    /// Record a new owner and bump the generation.
    pub fn set_owner(&mut self, owner: Option<ClusterNode>) {
        if self.owner != owner {
            self.generation += 1;
            self.acquired_at = owner.as_ref().map(|_| Utc::now());
        }
        self.owner = owner;
    }

    // =========================================================================
    // Local holds
    // =========================================================================

    pub fn hold_count(&self, context: LockContext) -> u32 {
        self.holds.get(&context).copied().unwrap_or(0)
    }

    pub fn total_holds(&self) -> u32 {
        self.holds.values().sum()
    }

    /// Increment `context`'s count and return the new value.
    pub fn add_hold(&mut self, context: LockContext) -> u32 {
        let count = self.holds.entry(context).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrement `context`'s count. Returns the remaining count, or `None` if
    /// the context held nothing.
    pub fn remove_hold(&mut self, context: LockContext) -> Option<u32> {
        let count = self.holds.get_mut(&context)?;
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            self.holds.remove(&context);
        }
        Some(remaining)
    }

    // =========================================================================
    // Queue
    // =========================================================================

    fn take_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    pub fn enqueue_local(&mut self, context: LockContext) -> u64 {
        let ticket = self.take_ticket();
        self.queue.push_back(Requester::Local { context, ticket });
        ticket
    }

    pub fn enqueue_remote(&mut self, node: ClusterNode) -> u64 {
        let ticket = self.take_ticket();
        self.queue.push_back(Requester::Remote { node, ticket });
        ticket
    }

    pub fn dequeue(&mut self, ticket: u64) -> bool {
        let before = self.queue.len();
        self.queue.retain(|r| r.ticket() != ticket);
        self.queue.len() != before
    }

    pub fn is_queued(&self, ticket: u64) -> bool {
        self.queue.iter().any(|r| r.ticket() == ticket)
    }

    pub fn is_first(&self, ticket: u64) -> bool {
        self.queue.front().map(Requester::ticket) == Some(ticket)
    }

    /// Whether a remote requester was queued before `ticket`.
    pub fn remote_ahead_of(&self, ticket: u64) -> bool {
        self.queue
            .iter()
            .take_while(|r| r.ticket() != ticket)
            .any(Requester::is_remote)
    }

    pub fn has_remote_waiter(&self) -> bool {
        self.queue.iter().any(Requester::is_remote)
    }

    pub fn remote_waiters(&self) -> usize {
        self.queue.iter().filter(|r| r.is_remote()).count()
    }

    /// Drop every queued request of `node`. Returns how many were removed.
    pub fn remove_remote(&mut self, node: &ClusterNode) -> usize {
        let before = self.queue.len();
        self.queue
            .retain(|r| !matches!(r, Requester::Remote { node: n, .. } if n == node));
        before - self.queue.len()
    }

    /// Drop queued requests whose member fails `keep`.
    pub fn retain_remote(&mut self, mut keep: impl FnMut(&ClusterNode) -> bool) -> usize {
        let before = self.queue.len();
        self.queue.retain(|r| match r {
            Requester::Remote { node, .. } => keep(node),
            Requester::Local { .. } => true,
        });
        before - self.queue.len()
    }

    // =========================================================================
    // Provisional grants
    // =========================================================================

    /// The member holding an unexpired grant from us, if any.
    pub fn active_grant(&self, now: Instant) -> Option<&ClusterNode> {
        self.pending_grant
            .as_ref()
            .filter(|g| g.expires_at > now)
            .map(|g| &g.node)
    }

    pub fn grant(&mut self, node: ClusterNode, expires_at: Instant) {
        self.pending_grant = Some(PendingGrant { node, expires_at });
    }

    /// Clear the grant if it was handed to `node`.
    pub fn clear_grant_for(&mut self, node: &ClusterNode) -> bool {
        if self.pending_grant.as_ref().is_some_and(|g| &g.node == node) {
            self.pending_grant = None;
            return true;
        }
        false
    }

    /// Nobody owns, holds, waits for or negotiates this lock.
    pub fn is_idle(&self) -> bool {
        self.owner.is_none()
            && self.queue.is_empty()
            && self.holds.is_empty()
            && !self.requesting
            && self.pending_grant.is_none()
    }

    pub fn info(&self) -> LockInfo {
        LockInfo {
            name: self.name.clone(),
            owner: self.owner.clone(),
            local_holds: self.total_holds(),
            local_contexts: self.holds.len(),
            queued: self.queue.len(),
            remote_waiters: self.remote_waiters(),
            pending_grant: self.pending_grant.as_ref().map(|g| g.node.clone()),
            generation: self.generation,
            acquired_at: self.acquired_at,
        }
    }
}
