//! In-process group transport.
//!
//! [`InMemoryNetwork`] simulates a cluster inside one process: members join and
//! leave, crash, and can be split into partitions that later heal. Every
//! membership change installs a fresh view (with a new, globally increasing
//! view-id) at each live member and notifies subscribed listeners.
//!
//! Messages are encoded with the JSON codec on the way out and decoded at the
//! receiver, so the wire format is exercised by every test.
//!
//! `Acquire` requests are handled on a dedicated thread per target because a
//! receiver may block until its local holders yield. All other messages are
//! delivered synchronously on the caller's thread, which keeps per-sender
//! ordering trivially intact.

use super::codec;
use super::message::{LockMessage, LockResponse, MemberResponse};
use super::{GroupTransport, MembershipListener, MessageHandler};
use crate::error::{LockError, Result};
use crate::node::{ClusterNode, ServiceName, View};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// How often a pending request re-checks whether its target is still reachable.
const REACHABILITY_POLL: Duration = Duration::from_millis(10);

/// Shared fabric connecting all in-memory members.
pub struct InMemoryNetwork {
    state: Mutex<NetworkState>,
}

#[derive(Default)]
struct NetworkState {
    last_view_id: u64,
    /// Live members in join order (most senior first).
    members: Vec<ClusterNode>,
    endpoints: HashMap<ClusterNode, Arc<Endpoint>>,
    /// Partition group per member; members in different groups cannot talk.
    groups: HashMap<ClusterNode, usize>,
}

impl NetworkState {
    fn group_of(&self, node: &ClusterNode) -> usize {
        self.groups.get(node).copied().unwrap_or(0)
    }

    fn reachable(&self, from: &ClusterNode, to: &ClusterNode) -> bool {
        self.endpoints.contains_key(from)
            && self.endpoints.contains_key(to)
            && self.group_of(from) == self.group_of(to)
    }
}

/// One member's attachment point.
struct Endpoint {
    node: ClusterNode,
    view: Mutex<View>,
    handlers: Mutex<HashMap<ServiceName, Arc<dyn MessageHandler>>>,
    listeners: Mutex<HashMap<ServiceName, Arc<dyn MembershipListener>>>,
}

/// A pending listener callback, invoked after the network lock is released.
type Notification = (Arc<dyn MembershipListener>, View, View);

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(NetworkState::default()),
        })
    }

    /// Add a member and install a new view everywhere.
    pub fn join(self: &Arc<Self>, node: impl Into<ClusterNode>) -> Result<Arc<InMemoryTransport>> {
        let node = node.into();
        let (endpoint, notifications) = {
            let mut state = self.state.lock();
            if state.endpoints.contains_key(&node) {
                return Err(LockError::Transport(format!(
                    "member '{}' is already part of the network",
                    node
                )));
            }

            let endpoint = Arc::new(Endpoint {
                node: node.clone(),
                view: Mutex::new(View::default()),
                handlers: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
            });
            state.members.push(node.clone());
            state.endpoints.insert(node.clone(), Arc::clone(&endpoint));
            // Newcomers land in the partition of the current coordinator.
            let group = state
                .members
                .first()
                .map(|first| state.group_of(first))
                .unwrap_or(0);
            state.groups.insert(node.clone(), group);

            (endpoint, Self::install_views(&mut state))
        };
        Self::notify(notifications);

        tracing::debug!(node = %node, "member joined in-memory network");
        Ok(Arc::new(InMemoryTransport {
            network: Arc::clone(self),
            endpoint,
        }))
    }

    /// Remove a member that shuts down cleanly.
    pub fn leave(&self, node: &ClusterNode) {
        self.remove_member(node, "left");
    }

    /// Remove a member without giving it a chance to clean up.
    ///
    /// Requests that are still waiting for an answer from `node` complete
    /// with no response.
    pub fn crash(&self, node: &ClusterNode) {
        self.remove_member(node, "crashed");
    }

    /// Split the live members into isolated groups.
    ///
    /// Members not named in any group end up alone in their own partition.
    pub fn partition(&self, groups: &[Vec<ClusterNode>]) {
        let notifications = {
            let mut state = self.state.lock();
            let mut assignment = HashMap::new();
            for (index, group) in groups.iter().enumerate() {
                for node in group {
                    assignment.insert(node.clone(), index);
                }
            }
            let mut next_group = groups.len();
            for node in state.members.clone() {
                let group = match assignment.get(&node) {
                    Some(group) => *group,
                    None => {
                        next_group += 1;
                        next_group
                    }
                };
                state.groups.insert(node, group);
            }
            Self::install_views(&mut state)
        };
        Self::notify(notifications);
        tracing::debug!(groups = groups.len(), "in-memory network partitioned");
    }

    /// Merge all partitions back into a single group.
    pub fn heal(&self) {
        let notifications = {
            let mut state = self.state.lock();
            for group in state.groups.values_mut() {
                *group = 0;
            }
            Self::install_views(&mut state)
        };
        Self::notify(notifications);
        tracing::debug!("in-memory network healed");
    }

    /// Live members in join order.
    pub fn members(&self) -> Vec<ClusterNode> {
        self.state.lock().members.clone()
    }

    pub fn is_reachable(&self, from: &ClusterNode, to: &ClusterNode) -> bool {
        self.state.lock().reachable(from, to)
    }

    fn remove_member(&self, node: &ClusterNode, how: &str) {
        let notifications = {
            let mut state = self.state.lock();
            if state.endpoints.remove(node).is_none() {
                return;
            }
            state.members.retain(|m| m != node);
            state.groups.remove(node);
            Self::install_views(&mut state)
        };
        Self::notify(notifications);
        tracing::debug!(node = %node, how, "member removed from in-memory network");
    }

    /// Bump the view-id and give every live member the view of its partition.
    fn install_views(state: &mut NetworkState) -> Vec<Notification> {
        state.last_view_id += 1;
        let view_id = state.last_view_id;
        let mut notifications = Vec::new();

        for node in &state.members {
            let group = state.group_of(node);
            let members: Vec<ClusterNode> = state
                .members
                .iter()
                .filter(|m| state.group_of(m) == group)
                .cloned()
                .collect();
            let new_view = View::new(view_id, members);

            let Some(endpoint) = state.endpoints.get(node) else {
                continue;
            };
            let old_view = std::mem::replace(&mut *endpoint.view.lock(), new_view.clone());
            for listener in endpoint.listeners.lock().values() {
                notifications.push((Arc::clone(listener), old_view.clone(), new_view.clone()));
            }
        }
        notifications
    }

    fn notify(notifications: Vec<Notification>) {
        for (listener, old_view, new_view) in notifications {
            listener.membership_changed(&old_view, &new_view);
        }
    }

    /// Encode, deliver and answer one message. `None` if the target cannot be
    /// reached before or after handling it.
    fn deliver(
        &self,
        sender: &ClusterNode,
        service: &ServiceName,
        target: &ClusterNode,
        bytes: &[u8],
    ) -> Option<LockResponse> {
        let handler = {
            let state = self.state.lock();
            if !state.reachable(sender, target) {
                return None;
            }
            let endpoint = state.endpoints.get(target)?;
            let handler = endpoint.handlers.lock().get(service).cloned();
            handler
        };

        let Some(handler) = handler else {
            return Some(LockResponse::Unavailable);
        };

        let message = match codec::decode_message(bytes) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, target = %target, "dropping undecodable message");
                return None;
            }
        };

        let response = handler.handle(sender, message);

        // A reply from a member that crashed meanwhile is lost.
        if !self.is_reachable(sender, target) {
            return None;
        }

        match codec::encode_response(&response).and_then(|b| codec::decode_response(&b)) {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(error = %e, target = %target, "dropping undecodable response");
                None
            }
        }
    }
}

/// A member's handle on an [`InMemoryNetwork`].
pub struct InMemoryTransport {
    network: Arc<InMemoryNetwork>,
    endpoint: Arc<Endpoint>,
}

impl InMemoryTransport {
    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }

    fn peers(&self) -> Vec<ClusterNode> {
        self.endpoint
            .view
            .lock()
            .members
            .iter()
            .filter(|m| **m != self.endpoint.node)
            .cloned()
            .collect()
    }

    /// Run blocking deliveries in parallel and wait for all answers, giving up
    /// on a target once it becomes unreachable or the deadline passes.
    fn deliver_parallel(
        &self,
        service: &ServiceName,
        targets: &[ClusterNode],
        bytes: &[u8],
        timeout: Duration,
    ) -> Vec<MemberResponse> {
        let (tx, rx) = mpsc::channel();
        for target in targets {
            let tx = tx.clone();
            let network = Arc::clone(&self.network);
            let sender = self.endpoint.node.clone();
            let service = service.clone();
            let target = target.clone();
            let bytes = bytes.to_vec();
            thread::spawn(move || {
                let response = network.deliver(&sender, &service, &target, &bytes);
                let _ = tx.send((target, response));
            });
        }
        drop(tx);

        let deadline = Instant::now() + timeout;
        let mut answers: HashMap<ClusterNode, Option<LockResponse>> = HashMap::new();

        while answers.len() < targets.len() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match rx.recv_timeout((deadline - now).min(REACHABILITY_POLL)) {
                Ok((target, response)) => {
                    answers.insert(target, response);
                }
                Err(RecvTimeoutError::Timeout) => {
                    for target in targets {
                        if !answers.contains_key(target)
                            && !self.network.is_reachable(&self.endpoint.node, target)
                        {
                            answers.insert(target.clone(), None);
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        targets
            .iter()
            .map(|target| {
                let response = answers.remove(target).flatten();
                MemberResponse::new(target.clone(), response)
            })
            .collect()
    }
}

impl GroupTransport for InMemoryTransport {
    fn local_node(&self) -> ClusterNode {
        self.endpoint.node.clone()
    }

    fn current_view(&self) -> View {
        self.endpoint.view.lock().clone()
    }

    fn register_handler(
        &self,
        service: &ServiceName,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let mut handlers = self.endpoint.handlers.lock();
        if handlers.contains_key(service) {
            return Err(LockError::Transport(format!(
                "a handler for service '{}' is already registered on {}",
                service, self.endpoint.node
            )));
        }
        handlers.insert(service.clone(), handler);
        Ok(())
    }

    fn unregister_handler(&self, service: &ServiceName) {
        self.endpoint.handlers.lock().remove(service);
    }

    fn subscribe(&self, service: &ServiceName, listener: Arc<dyn MembershipListener>) {
        self.endpoint
            .listeners
            .lock()
            .insert(service.clone(), listener);
    }

    fn unsubscribe(&self, service: &ServiceName) {
        self.endpoint.listeners.lock().remove(service);
    }

    fn broadcast(
        &self,
        service: &ServiceName,
        message: &LockMessage,
        timeout: Duration,
    ) -> Result<Vec<MemberResponse>> {
        let bytes = codec::encode_message(message)?;
        let targets = self.peers();

        if message.may_block() {
            return Ok(self.deliver_parallel(service, &targets, &bytes, timeout));
        }

        Ok(targets
            .into_iter()
            .map(|target| {
                let response =
                    self.network
                        .deliver(&self.endpoint.node, service, &target, &bytes);
                MemberResponse::new(target, response)
            })
            .collect())
    }

    fn send(
        &self,
        service: &ServiceName,
        target: &ClusterNode,
        message: &LockMessage,
        timeout: Duration,
    ) -> Result<Option<LockResponse>> {
        let bytes = codec::encode_message(message)?;

        if message.may_block() {
            let mut responses =
                self.deliver_parallel(service, std::slice::from_ref(target), &bytes, timeout);
            return Ok(responses.pop().and_then(|r| r.response));
        }

        Ok(self
            .network
            .deliver(&self.endpoint.node, service, target, &bytes))
    }
}
