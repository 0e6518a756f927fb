//! Group-communication seam used by the lock manager.
//!
//! The manager only needs four things from the group layer: its own identity,
//! the current membership [`View`], request/response messaging to the other
//! members, and view-change notifications. [`GroupTransport`] captures exactly
//! that so the protocol can run against [`memory::InMemoryNetwork`] in tests and
//! simulations, or against a real group-communication stack.
//!
//! Delivery contract expected by the manager:
//! - messages from one sender to one receiver are delivered in send order
//! - a member that crashed or became unreachable answers `None`
//! - view changes are delivered to every subscribed member of the new view

pub mod codec;
pub mod memory;
pub mod message;


use crate::error::Result;
use crate::node::{ClusterNode, ServiceName, View};
use std::sync::Arc;
use std::time::Duration;

pub use memory::{InMemoryNetwork, InMemoryTransport};
pub use message::{LockMessage, LockResponse, MemberResponse};

/// Receives protocol messages addressed to a service.
///
/// Called on transport threads. Implementations may block (an `Acquire` that
/// waits for a local holder to yield) but must eventually answer.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, sender: &ClusterNode, message: LockMessage) -> LockResponse;
}

/// Receives membership changes for a service.
pub trait MembershipListener: Send + Sync {
    fn membership_changed(&self, previous: &View, current: &View);
}

/// Membership and messaging primitives of a group-communication layer.
pub trait GroupTransport: Send + Sync {
    /// Identity of the member this transport belongs to.
    fn local_node(&self) -> ClusterNode;

    /// The view as currently installed at this member.
    fn current_view(&self) -> View;

    /// Install `handler` for messages addressed to `service` at this member.
    ///
    /// Fails if a handler is already registered under the same name.
    fn register_handler(&self, service: &ServiceName, handler: Arc<dyn MessageHandler>)
    -> Result<()>;

    fn unregister_handler(&self, service: &ServiceName);

    /// Deliver view changes for `service` to `listener`.
    fn subscribe(&self, service: &ServiceName, listener: Arc<dyn MembershipListener>);

    fn unsubscribe(&self, service: &ServiceName);

    /// Send `message` to every other member of the current view and collect
    /// one [`MemberResponse`] per member, waiting at most `timeout`.
    fn broadcast(
        &self,
        service: &ServiceName,
        message: &LockMessage,
        timeout: Duration,
    ) -> Result<Vec<MemberResponse>>;

    /// Send `message` to a single member. `Ok(None)` means no answer.
    fn send(
        &self,
        service: &ServiceName,
        target: &ClusterNode,
        message: &LockMessage,
        timeout: Duration,
    ) -> Result<Option<LockResponse>>;
}
