//! Membership changes.
//!
//! When a member leaves the view its locks are released implicitly: every
//! entry owned by a departed member loses its owner, and grants or parked
//! requests of departed members are dropped. Blocked local callers are woken
//! so they can run a round against the new view right away.
//!
//! When members join, for example after a partition heals, every lock owned
//! here is announced with `Assert` so that duplicate ownership is detected and
//! resolved in favor of the superior member.
//!
//! Views are applied strictly in view-id order; a duplicate or older view is
//! ignored, which makes delivery of the same change twice harmless.

use super::manager::Inner;
use crate::events::EventAction;
use crate::node::{ClusterNode, View};
use crate::transport::{LockMessage, MembershipListener};
use serde_json::json;
use std::sync::Weak;

/// Reconciles lock state with membership changes.
pub struct ViewChangeHandler {
    inner: Weak<Inner>,
}

impl ViewChangeHandler {
    pub(super) fn new(inner: Weak<Inner>) -> Self {
        Self { inner }
    }

    /// Apply `current`. Returns `false` if the view was already applied (or
    /// superseded) or the manager is gone.
    pub fn on_view_change(&self, previous: &View, current: &View) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.apply_view(previous, current),
            None => false,
        }
    }
}

impl MembershipListener for ViewChangeHandler {
    fn membership_changed(&self, previous: &View, current: &View) {
        self.on_view_change(previous, current);
    }
}

impl Inner {
    pub(super) fn apply_view(&self, reported_previous: &View, current: &View) -> bool {
        if self.is_stopped() {
            return false;
        }

        let (previous, asserts) = {
            let mut view = self.view.lock();
            if current.view_id <= view.view_id {
                tracing::debug!(
                    view_id = current.view_id,
                    applied = view.view_id,
                    "ignoring duplicate or stale view"
                );
                return false;
            }
            let previous = std::mem::replace(&mut *view, current.clone());

            let mut pending = self.pending_asserts.lock();
            let (ready, later): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .filter(|(_, _, view_id)| *view_id >= current.view_id)
                .partition(|(_, _, view_id)| *view_id == current.view_id);
            *pending = later;
            (previous, ready)
        };

        if !current.contains(&self.local) {
            tracing::warn!(node = %self.local, view = %current, "local member is not part of the new view");
        }

        let departed = current.departed_since(&previous);
        let joined = current.joined_since(&previous);
        tracing::info!(
            view = %current,
            reported_previous = reported_previous.view_id,
            departed = departed.len(),
            joined = joined.len(),
            "installed new view"
        );

        let mut reclaimed: Vec<(String, ClusterNode)> = Vec::new();

        for entry in self.registry.entries() {
            let mut state = entry.state.lock();
            if state.invalid {
                continue;
            }
            let mut changed = false;

            if let Some(owner) = state.owner.clone()
                && owner != self.local
                && !current.contains(&owner)
            {
                state.set_owner(None);
                state.attempts = 0;
                state.retry_at = None;
                reclaimed.push((entry.name.clone(), owner));
                changed = true;
            }

            if state
                .pending_grant
                .as_ref()
                .is_some_and(|g| !current.contains(&g.node))
            {
                state.pending_grant = None;
                changed = true;
            }

            if state.retain_remote(|node| current.contains(node)) > 0 {
                changed = true;
            }

            if changed {
                entry.notify();
            }
        }

        for (name, owner) in &reclaimed {
            tracing::info!(lock = %name, owner = %owner, "reclaimed lock of departed member");
            self.record(
                EventAction::Reclaimed,
                Some(name),
                json!({"owner": owner.to_string(), "view_id": current.view_id}),
            );
        }

        // Claims that arrived before this view was installed here.
        for (name, holder, _) in asserts {
            if current.contains(&holder) {
                self.accept_claim(&name, &holder, true);
            }
        }

        if !joined.is_empty() {
            let owned: Vec<String> = self
                .registry
                .entries()
                .into_iter()
                .filter(|entry| {
                    let state = entry.state.lock();
                    !state.invalid && state.is_owned_by(&self.local)
                })
                .map(|entry| entry.name.clone())
                .collect();
            for name in &owned {
                self.announce_ownership(
                    name,
                    LockMessage::Assert {
                        lock: name.clone(),
                        holder: self.local.clone(),
                        view_id: current.view_id,
                    },
                );
            }
        }
        true
    }
}
