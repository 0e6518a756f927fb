//! Handling of protocol messages received from other members.

use super::manager::{Inner, WAIT_SLICE};
use super::registry::LockEntry;
use super::state::LockState;
use crate::events::EventAction;
use crate::node::ClusterNode;
use crate::transport::{LockMessage, LockResponse, MessageHandler};
use parking_lot::MutexGuard;
use serde_json::json;
use std::sync::Weak;
use std::time::{Duration, Instant};

/// Upper bound on how long a parked acquire request may wait here.
const MAX_PARK: Duration = Duration::from_secs(24 * 60 * 60);

/// Transport-facing adapter; answers `Unavailable` once the manager is gone.
pub(super) struct ProtocolEndpoint {
    inner: Weak<Inner>,
}

impl ProtocolEndpoint {
    pub(super) fn new(inner: Weak<Inner>) -> Self {
        Self { inner }
    }
}

impl MessageHandler for ProtocolEndpoint {
    fn handle(&self, sender: &ClusterNode, message: LockMessage) -> LockResponse {
        match self.inner.upgrade() {
            Some(inner) => inner.handle_message(sender, message),
            None => LockResponse::Unavailable,
        }
    }
}

impl Inner {
    pub(super) fn handle_message(&self, sender: &ClusterNode, message: LockMessage) -> LockResponse {
        if !self.is_running() {
            return LockResponse::Unavailable;
        }
        tracing::trace!(from = %sender, kind = message.kind(), lock = message.lock(), "received lock message");

        match message {
            LockMessage::Acquire {
                lock,
                requester,
                view_id,
                timeout_ms,
            } => self.handle_acquire(&lock, &requester, view_id, timeout_ms),
            LockMessage::Release { lock, holder, .. } => self.handle_release(&lock, &holder),
            LockMessage::Acquired {
                lock,
                holder,
                view_id,
            } => self.handle_acquired(&lock, &holder, view_id),
            LockMessage::Cancel { lock, requester } => self.handle_cancel(&lock, &requester),
            LockMessage::Assert {
                lock,
                holder,
                view_id,
            } => self.handle_assert(&lock, &holder, view_id),
        }
    }

    fn handle_acquire(
        &self,
        name: &str,
        requester: &ClusterNode,
        view_id: u64,
        timeout_ms: Option<u64>,
    ) -> LockResponse {
        let current = self.view_id();
        if view_id != current {
            tracing::debug!(lock = name, from = %requester, view_id, current, "acquire from another view");
            return LockResponse::StaleView { view_id: current };
        }

        let wait = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.method_call_timeout())
            .min(MAX_PARK);
        let arrived = Instant::now();
        let deadline = arrived + wait;
        let grant_expires = deadline + self.config.grant_expiry_slack();

        loop {
            let (entry, _) = self.registry.get_or_create(name);
            let state = entry.state.lock();
            if state.invalid {
                continue;
            }
            return self.decide_acquire(&entry, state, requester, deadline, grant_expires, wait.is_zero());
        }
    }

    /// Answer an acquire request, parking it while a local holder is busy.
    fn decide_acquire(
        &self,
        entry: &LockEntry,
        mut state: MutexGuard<'_, LockState>,
        requester: &ClusterNode,
        deadline: Instant,
        grant_expires: Instant,
        no_wait: bool,
    ) -> LockResponse {
        let mut ticket: Option<u64> = None;

        loop {
            if !self.is_running() {
                if let Some(ticket) = ticket {
                    state.dequeue(ticket);
                }
                return LockResponse::Unavailable;
            }

            if state.is_owned_by(requester) {
                if let Some(ticket) = ticket {
                    state.dequeue(ticket);
                }
                return LockResponse::Ok;
            }

            if state.is_owned_by(&self.local) {
                let parked = match ticket {
                    Some(parked) => parked,
                    None => {
                        if state.holds.is_empty() && state.queue.is_empty() {
                            return self.yield_to(entry, state, requester, grant_expires);
                        }
                        if no_wait {
                            return LockResponse::Reject {
                                holder: self.local.clone(),
                            };
                        }
                        let new_ticket = state.enqueue_remote(requester.clone());
                        ticket = Some(new_ticket);
                        tracing::debug!(lock = %state.name, from = %requester, "parked acquire request behind local holders");
                        new_ticket
                    }
                };

                if !state.is_queued(parked) {
                    // Cancelled by the requester or dropped by a view change.
                    return LockResponse::Reject {
                        holder: self.local.clone(),
                    };
                }

                if state.holds.is_empty() && state.is_first(parked) {
                    state.dequeue(parked);
                    return self.yield_to(entry, state, requester, grant_expires);
                }

                let now = Instant::now();
                if now >= deadline {
                    state.dequeue(parked);
                    entry.notify();
                    return LockResponse::Reject {
                        holder: self.local.clone(),
                    };
                }
                entry
                    .changed
                    .wait_until(&mut state, deadline.min(now + WAIT_SLICE));
                continue;
            }

            // Not the owner (or no longer: we yielded to someone else or lost
            // a split-brain resolution while the request was parked).
            if let Some(ticket) = ticket.take() {
                state.dequeue(ticket);
                entry.notify();
            }

            if let Some(grantee) = state.active_grant(Instant::now())
                && grantee != requester
            {
                return LockResponse::Reject {
                    holder: grantee.clone(),
                };
            }

            if state.requesting && !self.view().is_superior(requester, &self.local) {
                return LockResponse::Reject {
                    holder: self.local.clone(),
                };
            }

            state.grant(requester.clone(), grant_expires);
            return LockResponse::Ok;
        }
    }

    /// Hand ownership to a remote requester.
    fn yield_to(
        &self,
        entry: &LockEntry,
        mut state: MutexGuard<'_, LockState>,
        requester: &ClusterNode,
        grant_expires: Instant,
    ) -> LockResponse {
        state.set_owner(None);
        state.grant(requester.clone(), grant_expires);
        let generation = state.generation;
        entry.notify();
        drop(state);

        tracing::debug!(lock = %entry.name, to = %requester, "yielded lock");
        self.record(
            EventAction::Yielded,
            Some(&entry.name),
            json!({"to": requester.to_string(), "generation": generation}),
        );
        LockResponse::Ok
    }

    fn handle_release(&self, name: &str, holder: &ClusterNode) -> LockResponse {
        let Some(entry) = self.registry.get(name) else {
            return LockResponse::Ack;
        };
        let mut state = entry.state.lock();
        if state.invalid {
            return LockResponse::Ack;
        }

        let mut changed = false;
        if state.is_owned_by(holder) {
            state.set_owner(None);
            state.retry_at = None;
            changed = true;
        }
        if state.clear_grant_for(holder) {
            changed = true;
        }
        if !changed {
            return LockResponse::Ack;
        }

        entry.notify();
        let evict = self.config.evict_idle_locks && state.is_idle();
        drop(state);

        if evict {
            self.registry.evict_if_idle(name);
        }
        LockResponse::Ack
    }

    fn handle_acquired(&self, name: &str, holder: &ClusterNode, view_id: u64) -> LockResponse {
        let view = self.view();
        if !view.contains(holder) {
            tracing::debug!(lock = name, holder = %holder, view_id, "ignoring ownership of non-member");
            return LockResponse::StaleView {
                view_id: view.view_id,
            };
        }
        self.accept_claim(name, holder, false)
    }

    fn handle_assert(&self, name: &str, holder: &ClusterNode, view_id: u64) -> LockResponse {
        {
            let view = self.view.lock();
            if view_id < view.view_id {
                return LockResponse::StaleView {
                    view_id: view.view_id,
                };
            }
            if view_id > view.view_id {
                // The sender installed a view this member has not applied yet.
                tracing::debug!(lock = name, holder = %holder, view_id, current = view.view_id, "deferring assert until its view is applied");
                self.pending_asserts
                    .lock()
                    .push((name.to_string(), holder.clone(), view_id));
                return LockResponse::Ack;
            }
        }
        self.accept_claim(name, holder, true)
    }

    /// Record `holder` as owner unless we own the lock and are superior.
    ///
    /// With `merging` set, a claim is also refused when the recorded owner is
    /// a live member superior to the claimant; the claimant is told who it is.
    pub(super) fn accept_claim(&self, name: &str, holder: &ClusterNode, merging: bool) -> LockResponse {
        loop {
            let (entry, _) = self.registry.get_or_create(name);
            let mut state = entry.state.lock();
            if state.invalid {
                continue;
            }

            if state.is_owned_by(&self.local) && *holder != self.local {
                if self.view().is_superior(holder, &self.local) {
                    drop(state);
                    self.relinquish_to(name, holder);
                    return LockResponse::Ack;
                }
                tracing::warn!(lock = name, claimant = %holder, "rejecting ownership claim of inferior member");
                return LockResponse::Reject {
                    holder: self.local.clone(),
                };
            }

            if merging
                && let Some(owner) = state.owner.clone()
                && owner != *holder
                && owner != self.local
            {
                let view = self.view();
                if view.contains(&owner) && view.is_superior(&owner, holder) {
                    tracing::debug!(lock = name, claimant = %holder, owner = %owner, "claim loses to recorded owner");
                    return LockResponse::Reject { holder: owner };
                }
            }

            state.set_owner(Some(holder.clone()));
            state.clear_grant_for(holder);
            entry.notify();
            return LockResponse::Ack;
        }
    }

    fn handle_cancel(&self, name: &str, requester: &ClusterNode) -> LockResponse {
        let Some(entry) = self.registry.get(name) else {
            return LockResponse::Ack;
        };
        let mut state = entry.state.lock();
        let removed = state.remove_remote(requester);
        let cleared = state.clear_grant_for(requester);
        if removed > 0 || cleared {
            tracing::debug!(lock = name, from = %requester, removed, "cancelled remote request");
            entry.notify();
        }
        LockResponse::Ack
    }
}
