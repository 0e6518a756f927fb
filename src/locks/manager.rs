//! The cluster lock manager.
//!
//! # Protocol
//!
//! A caller that wants a lock its member does not own runs an *acquisition
//! round*: it broadcasts `Acquire` to every other member of the current view
//! and wins only if nobody objects. Each member answers according to what it
//! knows about the lock:
//!
//! - the owner parks the request until its local holders are done and then
//!   yields (or rejects it once the requester's timeout passes)
//! - a member running its own round grants only requesters that are earlier
//!   in the view and rejects the rest
//! - a member that already granted somebody else rejects
//! - anyone else grants provisionally
//!
//! The winner records itself as owner and broadcasts `Acquired`. A loser
//! broadcasts `Release` to retract its provisional grants and backs off for a
//! time that grows with the number of lost rounds and the member's position in
//! the view.
//!
//! Local callers share ownership: once the member owns a lock, every local
//! context may hold it (each with its own re-entrancy count) without another
//! round, unless a remote requester queued up first.

use super::context::LockContext;
use super::guard::LockGuard;
use super::protocol::ProtocolEndpoint;
use super::registry::{LockEntry, LockRegistry};
use super::state::LockState;
use super::types::{LockInfo, LockResult};
use super::view::ViewChangeHandler;
use crate::config::{Config, ReleasePolicy};
use crate::error::{LockError, Result};
use crate::events::{EventAction, EventJournal, LockEvent};
use crate::node::{ClusterNode, ServiceName, View};
use crate::transport::{GroupTransport, LockMessage, LockResponse, MemberResponse};
use parking_lot::{Mutex, MutexGuard};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest a blocked caller sleeps before re-checking its wait conditions.
pub(super) const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Status {
    Created,
    Started,
    Stopped,
}

/// Result of one acquisition round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RoundOutcome {
    Won,
    Lost { holder: Option<ClusterNode> },
}

/// Cluster-wide lock manager for one member.
///
/// Cloning is cheap; clones share the same manager.
#[derive(Clone)]
pub struct ClusterLockManager {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) config: Config,
    pub(super) service: ServiceName,
    pub(super) local: ClusterNode,
    pub(super) transport: Arc<dyn GroupTransport>,
    pub(super) registry: Arc<LockRegistry>,
    journal: EventJournal,
    status: Mutex<Status>,
    pub(super) view: Mutex<View>,

    /// `Assert`s stamped with a view this member has not applied yet, as
    /// `(lock, holder, view_id)`. Replayed once that view is installed.
    pub(super) pending_asserts: Mutex<Vec<(String, ClusterNode, u64)>>,
}

impl fmt::Debug for ClusterLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterLockManager")
            .field("service", &self.inner.service)
            .field("local", &self.inner.local)
            .field("status", &*self.inner.status.lock())
            .finish()
    }
}

impl ClusterLockManager {
    /// Create a manager for the member behind `transport`.
    ///
    /// The manager does not take part in the protocol until [`start`](Self::start).
    pub fn new(
        config: Config,
        transport: Arc<dyn GroupTransport>,
        registry: Arc<LockRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        let local = transport.local_node();
        if let Some(name) = &config.node_name
            && name != local.name()
        {
            return Err(LockError::Config(format!(
                "config validation failed: node_name '{}' does not match transport identity '{}'",
                name, local
            )));
        }

        let journal = EventJournal::new(config.event_log.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                service: config.service(),
                config,
                local,
                transport,
                registry,
                journal,
                status: Mutex::new(Status::Created),
                view: Mutex::new(View::default()),
                pending_asserts: Mutex::new(Vec::new()),
            }),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Register with the transport and begin taking part in the protocol.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let mut status = inner.status.lock();
        match *status {
            Status::Started => {
                return Err(LockError::InvalidLifecycle(format!(
                    "{} is already started",
                    inner.service
                )));
            }
            Status::Stopped => {
                return Err(LockError::InvalidLifecycle(format!(
                    "{} was stopped and cannot be restarted",
                    inner.service
                )));
            }
            Status::Created => {}
        }

        let listener = Arc::new(ViewChangeHandler::new(Arc::downgrade(inner)));
        inner.transport.subscribe(&inner.service, listener);

        let view = inner.transport.current_view();
        if !view.contains(&inner.local) {
            inner.transport.unsubscribe(&inner.service);
            return Err(LockError::Transport(format!(
                "{} is not a member of view {}",
                inner.local, view
            )));
        }
        {
            let mut current = inner.view.lock();
            if view.view_id > current.view_id {
                *current = view.clone();
            }
        }

        let endpoint = Arc::new(ProtocolEndpoint::new(Arc::downgrade(inner)));
        if let Err(e) = inner.transport.register_handler(&inner.service, endpoint) {
            inner.transport.unsubscribe(&inner.service);
            return Err(e);
        }

        *status = Status::Started;
        drop(status);

        tracing::info!(service = %inner.service, node = %inner.local, view = %view, "lock manager started");
        inner.record(EventAction::Started, None, json!({"view_id": view.view_id}));
        Ok(())
    }

    /// Leave the protocol: release every lock held here, withdraw pending
    /// requests, and fail all blocked callers with [`LockError::Stopped`].
    ///
    /// Stopping twice is a no-op.
    pub fn stop(&self) {
        let inner = &self.inner;
        {
            let mut status = inner.status.lock();
            match *status {
                Status::Stopped => return,
                Status::Created => {
                    *status = Status::Stopped;
                    return;
                }
                Status::Started => *status = Status::Stopped,
            }
        }

        inner.transport.unregister_handler(&inner.service);
        inner.transport.unsubscribe(&inner.service);

        let mut released = Vec::new();
        let mut cancelled = Vec::new();
        for entry in inner.registry.entries() {
            let mut state = entry.state.lock();
            if state.is_owned_by(&inner.local) {
                state.set_owner(None);
                released.push(entry.name.clone());
            } else if state.requesting {
                cancelled.push(entry.name.clone());
            }
            state.holds.clear();
            entry.notify();
        }

        let view_id = inner.view_id();
        for name in &released {
            inner.notify_peers(&LockMessage::Release {
                lock: name.clone(),
                holder: inner.local.clone(),
                view_id,
            });
        }
        for name in &cancelled {
            inner.notify_peers(&LockMessage::Cancel {
                lock: name.clone(),
                requester: inner.local.clone(),
            });
        }

        inner.registry.clear();
        *inner.view.lock() = View::default();
        inner.pending_asserts.lock().clear();

        tracing::info!(
            service = %inner.service,
            node = %inner.local,
            released = released.len(),
            cancelled = cancelled.len(),
            "lock manager stopped"
        );
        inner.record(
            EventAction::Stopped,
            None,
            json!({"released": released, "cancelled": cancelled}),
        );
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// Block until `context` holds `name`.
    pub fn lock(&self, name: &str, context: LockContext) -> Result<LockResult> {
        self.inner.acquire(name, context, None, false)
    }

    /// Like [`lock`](Self::lock), but a name this member has never seen is
    /// taken without an acquisition round.
    ///
    /// Only use this for names that are known to be fresh cluster-wide
    /// (for example a newly generated session id).
    pub fn lock_new(&self, name: &str, context: LockContext) -> Result<LockResult> {
        self.inner.acquire(name, context, None, true)
    }

    /// Try to take `name` within `timeout`.
    ///
    /// `Duration::ZERO` makes a single attempt that never waits for a holder;
    /// a timeout too large to represent waits forever.
    pub fn try_lock(&self, name: &str, context: LockContext, timeout: Duration) -> Result<bool> {
        match self
            .inner
            .acquire(name, context, Instant::now().checked_add(timeout), false)
        {
            Ok(_) => Ok(true),
            Err(LockError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lock `name` and return a guard that unlocks on drop.
    pub fn acquire(&self, name: &str, context: LockContext) -> Result<LockGuard> {
        let result = self.lock(name, context)?;
        Ok(LockGuard::new(self.clone(), name.to_string(), context, result))
    }

    /// Guarded variant of [`try_lock`](Self::try_lock) that reports the holder
    /// observed at expiry through [`LockError::Timeout`].
    pub fn acquire_timeout(
        &self,
        name: &str,
        context: LockContext,
        timeout: Duration,
    ) -> Result<LockGuard> {
        let result = self
            .inner
            .acquire(name, context, Instant::now().checked_add(timeout), false)?;
        Ok(LockGuard::new(self.clone(), name.to_string(), context, result))
    }

    /// Drop one hold of `context` on `name`.
    pub fn unlock(&self, name: &str, context: LockContext) -> Result<()> {
        self.inner.release(name, context, false)
    }

    /// Drop one hold and forget the lock once nobody holds it any more.
    pub fn unlock_and_remove(&self, name: &str, context: LockContext) -> Result<()> {
        self.inner.release(name, context, true)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Member this manager believes owns `name`.
    pub fn holder(&self, name: &str) -> Option<ClusterNode> {
        let entry = self.inner.registry.get(name)?;
        let state = entry.state.lock();
        state.owner.clone()
    }

    /// Whether any local context currently holds `name`.
    pub fn is_held_locally(&self, name: &str) -> bool {
        self.inner.registry.get(name).is_some_and(|entry| {
            let state = entry.state.lock();
            state.is_owned_by(&self.inner.local) && !state.holds.is_empty()
        })
    }

    pub fn hold_count(&self, name: &str, context: LockContext) -> u32 {
        self.inner
            .registry
            .get(name)
            .map(|entry| entry.state.lock().hold_count(context))
            .unwrap_or(0)
    }

    /// The view this manager operates in (empty unless started).
    pub fn current_view(&self) -> View {
        self.inner.view()
    }

    pub fn local_node(&self) -> &ClusterNode {
        &self.inner.local
    }

    pub fn service_name(&self) -> &ServiceName {
        &self.inner.service
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<LockRegistry> {
        &self.inner.registry
    }

    /// Snapshot of every lock known here, sorted by name.
    pub fn locks(&self) -> Vec<LockInfo> {
        let mut locks: Vec<LockInfo> = self
            .inner
            .registry
            .entries()
            .iter()
            .map(|entry| entry.state.lock().info())
            .collect();
        locks.sort_by(|a, b| a.name.cmp(&b.name));
        locks
    }

    pub fn lock_info(&self, name: &str) -> Option<LockInfo> {
        let entry = self.inner.registry.get(name)?;
        let info = entry.state.lock().info();
        Some(info)
    }

    #[cfg(test)]
    pub(super) fn view_handler(&self) -> ViewChangeHandler {
        ViewChangeHandler::new(Arc::downgrade(&self.inner))
    }

    /// Feed `message` to this member as if `sender` had sent it.
    #[cfg(test)]
    pub(super) fn receive(&self, sender: &ClusterNode, message: LockMessage) -> LockResponse {
        self.inner.handle_message(sender, message)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LockError::InvalidArgument(
            "lock name must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl Inner {
    pub(super) fn is_running(&self) -> bool {
        *self.status.lock() == Status::Started
    }

    pub(super) fn is_stopped(&self) -> bool {
        *self.status.lock() == Status::Stopped
    }

    fn ensure_running(&self) -> Result<()> {
        match *self.status.lock() {
            Status::Created => Err(LockError::NotStarted),
            Status::Stopped => Err(LockError::Stopped),
            Status::Started => Ok(()),
        }
    }

    pub(super) fn view(&self) -> View {
        self.view.lock().clone()
    }

    pub(super) fn view_id(&self) -> u64 {
        self.view.lock().view_id
    }

    pub(super) fn record(&self, action: EventAction, lock: Option<&str>, details: Value) {
        let mut event = LockEvent::new(action, &self.local).with_details(details);
        if let Some(lock) = lock {
            event = event.with_lock(lock);
        }
        self.journal.record(event);
    }

    /// Broadcast a notification, logging delivery problems.
    pub(super) fn notify_peers(&self, message: &LockMessage) -> Vec<MemberResponse> {
        match self
            .transport
            .broadcast(&self.service, message, self.config.method_call_timeout())
        {
            Ok(responses) => responses,
            Err(e) => {
                tracing::warn!(
                    lock = message.lock(),
                    kind = message.kind(),
                    error = %e,
                    "failed to broadcast lock notification"
                );
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    fn acquire(
        &self,
        name: &str,
        context: LockContext,
        deadline: Option<Instant>,
        new_lock: bool,
    ) -> Result<LockResult> {
        validate_name(name)?;
        self.ensure_running()?;

        loop {
            let (entry, created) = self.registry.get_or_create(name);
            let mut state = entry.state.lock();
            if state.invalid {
                continue;
            }

            if state.hold_count(context) > 0 {
                let count = state.add_hold(context);
                tracing::trace!(lock = name, context = %context, count, "re-entered lock");
                return Ok(LockResult::AlreadyHeld);
            }

            if new_lock && created && state.is_idle() {
                state.set_owner(Some(self.local.clone()));
                state.add_hold(context);
                let generation = state.generation;
                drop(state);

                self.announce_ownership(
                    name,
                    LockMessage::Acquired {
                        lock: name.to_string(),
                        holder: self.local.clone(),
                        view_id: self.view_id(),
                    },
                );
                tracing::debug!(lock = name, context = %context, "took new lock without a round");
                self.record(
                    EventAction::Acquired,
                    Some(name),
                    json!({"context": context.id(), "new_lock": true, "generation": generation}),
                );
                return Ok(LockResult::NewLock);
            }

            let ticket = state.enqueue_local(context);
            return self.wait_for_ownership(&entry, state, context, ticket, deadline);
        }
    }

    /// Wait in the entry's queue until this member owns the lock, running
    /// acquisition rounds when nothing else is in the way.
    fn wait_for_ownership(
        &self,
        entry: &LockEntry,
        mut state: MutexGuard<'_, LockState>,
        context: LockContext,
        ticket: u64,
        deadline: Option<Instant>,
    ) -> Result<LockResult> {
        let name = entry.name.as_str();
        let mut rounds = 0u32;
        let mut last_holder: Option<ClusterNode> = None;

        loop {
            if self.is_stopped() {
                state.dequeue(ticket);
                entry.notify();
                return Err(LockError::Stopped);
            }

            // Shared local ownership, unless a remote requester got in line first.
            if state.is_owned_by(&self.local) && !state.remote_ahead_of(ticket) {
                state.dequeue(ticket);
                state.add_hold(context);
                tracing::trace!(lock = name, context = %context, "joined local ownership");
                return Ok(LockResult::AlreadyHeld);
            }

            let now = Instant::now();
            let blocker = self.round_blocker(&state, now);
            let expired = deadline.is_some_and(|d| now >= d);

            if expired && (rounds > 0 || blocker.is_some()) {
                state.dequeue(ticket);
                let holder = state.owner.clone().or(last_holder);
                let cancel = rounds > 0 && !state.requesting;
                entry.notify();
                drop(state);

                if cancel {
                    self.notify_peers(&LockMessage::Cancel {
                        lock: name.to_string(),
                        requester: self.local.clone(),
                    });
                }
                tracing::debug!(lock = name, context = %context, rounds, "gave up waiting for lock");
                self.record(
                    EventAction::TimedOut,
                    Some(name),
                    json!({
                        "context": context.id(),
                        "rounds": rounds,
                        "holder": holder.as_ref().map(|h| h.to_string()),
                    }),
                );
                return Err(LockError::Timeout {
                    lock: name.to_string(),
                    holder,
                });
            }

            if let Some(until) = blocker {
                let mut until = until.min(now + WAIT_SLICE);
                if let Some(deadline) = deadline {
                    until = until.min(deadline);
                }
                entry.changed.wait_until(&mut state, until);
                continue;
            }

            // Nothing in the way: run a round with the state unlocked.
            state.requesting = true;
            rounds += 1;
            let view = self.view();
            let attempt = self.attempt_timeout(deadline, now);
            let grants_valid_until = now + attempt + self.config.grant_expiry_slack();
            // A round started at or past the deadline is the single attempt of
            // a zero timeout; only a round started earlier is bound by it.
            let commit_deadline = deadline.filter(|d| now < *d);

            let outcome = MutexGuard::unlocked(&mut state, || self.run_round(name, &view, attempt));
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    state.requesting = false;
                    state.dequeue(ticket);
                    entry.notify();
                    return Err(e);
                }
            };

            if outcome == RoundOutcome::Won {
                if self.commit_allowed(&state, &view, grants_valid_until, commit_deadline) {
                    state.requesting = false;
                    state.set_owner(Some(self.local.clone()));
                    state.attempts = 0;
                    state.retry_at = None;
                    state.dequeue(ticket);
                    state.add_hold(context);
                    let generation = state.generation;
                    entry.notify();
                    drop(state);

                    self.announce_ownership(
                        name,
                        LockMessage::Acquired {
                            lock: name.to_string(),
                            holder: self.local.clone(),
                            view_id: view.view_id,
                        },
                    );
                    tracing::debug!(lock = name, context = %context, rounds, view_id = view.view_id, "acquired lock from cluster");
                    self.record(
                        EventAction::Acquired,
                        Some(name),
                        json!({"context": context.id(), "rounds": rounds, "generation": generation, "view_id": view.view_id}),
                    );
                    return Ok(LockResult::AcquiredFromCluster);
                }

                // Pre-empted or too late: the win is void.
                MutexGuard::unlocked(&mut state, || self.retract(name, &view));
                if let Some(grantee) = state.active_grant(Instant::now()) {
                    last_holder = Some(grantee.clone());
                }
            } else if let RoundOutcome::Lost {
                holder: Some(holder),
            } = outcome
            {
                last_holder = Some(holder);
            }

            state.requesting = false;
            let position = view.position(&self.local).unwrap_or(view.len());
            let backoff = self.config.retry_backoff(state.attempts, position);
            state.attempts = state.attempts.saturating_add(1);
            state.retry_at = Some(Instant::now() + backoff);
            entry.notify();
            tracing::trace!(lock = name, rounds, backoff_ms = backoff.as_millis() as u64, "lost acquisition round");
        }
    }

    /// When a local round may not start yet, the instant worth re-checking at.
    fn round_blocker(&self, state: &LockState, now: Instant) -> Option<Instant> {
        if state.is_owned_by(&self.local) || state.requesting {
            return Some(now + WAIT_SLICE);
        }
        if let Some(grant) = &state.pending_grant
            && grant.node != self.local
            && grant.expires_at > now
        {
            return Some(grant.expires_at);
        }
        state.retry_at.filter(|at| *at > now)
    }

    fn attempt_timeout(&self, deadline: Option<Instant>, now: Instant) -> Duration {
        let call_timeout = self.config.method_call_timeout();
        match deadline {
            Some(deadline) => deadline.saturating_duration_since(now).min(call_timeout),
            None => call_timeout,
        }
    }

    /// A won round may only be committed if nothing changed underneath it.
    fn commit_allowed(
        &self,
        state: &LockState,
        view: &View,
        grants_valid_until: Instant,
        deadline: Option<Instant>,
    ) -> bool {
        let now = Instant::now();
        if !self.is_running() {
            return false;
        }
        if deadline.is_some_and(|d| now >= d) {
            tracing::debug!(lock = %state.name, "round finished after the caller's deadline");
            return false;
        }
        if now >= grants_valid_until {
            tracing::debug!(lock = %state.name, "round finished after its grants expired");
            return false;
        }
        if state.active_grant(now).is_some_and(|g| *g != self.local) {
            return false;
        }
        self.view_id() == view.view_id
    }

    fn run_round(&self, name: &str, view: &View, timeout: Duration) -> Result<RoundOutcome> {
        let message = LockMessage::Acquire {
            lock: name.to_string(),
            requester: self.local.clone(),
            view_id: view.view_id,
            timeout_ms: LockMessage::timeout_ms(Some(timeout)),
        };
        let responses = self.transport.broadcast(
            &self.service,
            &message,
            timeout + self.config.grant_expiry_slack(),
        )?;

        let outcome = evaluate_round(&responses);
        if outcome != RoundOutcome::Won {
            self.retract(name, view);
        }
        Ok(outcome)
    }

    /// Take back provisional grants handed out for a round we did not commit.
    fn retract(&self, name: &str, view: &View) {
        self.notify_peers(&LockMessage::Release {
            lock: name.to_string(),
            holder: self.local.clone(),
            view_id: view.view_id,
        });
    }

    /// Broadcast an ownership claim and step back if a superior member
    /// turns out to own the lock as well.
    ///
    /// An `Assert` answered with `StaleView` from a newer view is sent once
    /// more to that member, stamped with the view applied here by then.
    pub(super) fn announce_ownership(&self, name: &str, message: LockMessage) {
        let mut behind = Vec::new();
        for response in self.notify_peers(&message) {
            match response.response {
                Some(LockResponse::Reject { holder }) if holder != self.local => {
                    self.relinquish_to(name, &holder);
                    return;
                }
                Some(LockResponse::StaleView { view_id }) => {
                    if let LockMessage::Assert { view_id: sent, .. } = &message
                        && view_id > *sent
                    {
                        behind.push((response.member, view_id));
                    }
                }
                _ => {}
            }
        }

        for (member, newer) in behind {
            let view_id = self.view_id();
            if view_id < newer {
                tracing::debug!(lock = name, member = %member, view_id, newer, "view not applied yet, skipping assert retry");
                continue;
            }
            let retry = LockMessage::Assert {
                lock: name.to_string(),
                holder: self.local.clone(),
                view_id,
            };
            match self.transport.send(
                &self.service,
                &member,
                &retry,
                self.config.method_call_timeout(),
            ) {
                Ok(Some(LockResponse::Reject { holder })) if holder != self.local => {
                    self.relinquish_to(name, &holder);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(lock = name, member = %member, error = %e, "failed to resend ownership assertion");
                }
            }
        }
    }

    // =========================================================================
    // Release
    // =========================================================================

    fn release(&self, name: &str, context: LockContext, remove: bool) -> Result<()> {
        validate_name(name)?;
        self.ensure_running()?;

        let not_holder = || LockError::NotHolder {
            lock: name.to_string(),
            context,
            node: self.local.clone(),
        };

        let entry = self.registry.get(name).ok_or_else(not_holder)?;
        let mut state = entry.state.lock();
        if state.invalid {
            return Err(not_holder());
        }
        let remaining = state.remove_hold(context).ok_or_else(not_holder)?;
        if remove {
            state.removable = true;
        }
        if remaining > 0 || !state.holds.is_empty() {
            return Ok(());
        }

        // Last local hold dropped. Queued requesters take over from here: a
        // parked remote request gets the yield, a local one joins.
        if !state.queue.is_empty() {
            entry.notify();
            return Ok(());
        }

        let give_up = remove || self.config.release_policy == ReleasePolicy::Release;
        if !give_up || !state.is_owned_by(&self.local) {
            entry.notify();
            return Ok(());
        }

        state.set_owner(None);
        let generation = state.generation;
        let evict = state.removable || self.config.evict_idle_locks;
        entry.notify();
        drop(state);

        self.notify_peers(&LockMessage::Release {
            lock: name.to_string(),
            holder: self.local.clone(),
            view_id: self.view_id(),
        });
        tracing::debug!(lock = name, context = %context, "released lock");
        self.record(
            EventAction::Released,
            Some(name),
            json!({"context": context.id(), "generation": generation}),
        );

        if evict {
            match self.registry.remove(name) {
                Ok(()) => tracing::trace!(lock = name, "evicted idle lock"),
                Err(e) => tracing::trace!(lock = name, error = %e, "lock still in use, keeping entry"),
            }
        }
        Ok(())
    }

    /// Give up local ownership of `name` in favor of `winner`.
    pub(super) fn relinquish_to(&self, name: &str, winner: &ClusterNode) {
        let Some(entry) = self.registry.get(name) else {
            return;
        };
        let mut state = entry.state.lock();
        if !state.is_owned_by(&self.local) {
            return;
        }
        let dropped = state.total_holds();
        state.holds.clear();
        state.set_owner(Some(winner.clone()));
        state.clear_grant_for(winner);
        entry.notify();
        drop(state);

        tracing::error!(
            lock = name,
            winner = %winner,
            dropped_holds = dropped,
            "duplicate ownership detected, relinquishing lock to superior member"
        );
        self.record(
            EventAction::SplitBrainResolved,
            Some(name),
            json!({"winner": winner.to_string(), "dropped_holds": dropped}),
        );
    }
}

/// A round is won only if every member raised no objection.
pub(super) fn evaluate_round(responses: &[MemberResponse]) -> RoundOutcome {
    let mut won = true;
    let mut holder = None;
    for response in responses {
        match &response.response {
            Some(r) if r.is_no_objection() => {}
            Some(LockResponse::Reject { holder: h }) => {
                won = false;
                holder.get_or_insert_with(|| h.clone());
            }
            Some(other) => {
                tracing::trace!(member = %response.member, response = ?other, "round objection");
                won = false;
            }
            None => {
                tracing::debug!(member = %response.member, "no answer from member, retrying round");
                won = false;
            }
        }
    }
    if won {
        RoundOutcome::Won
    } else {
        RoundOutcome::Lost { holder }
    }
}
