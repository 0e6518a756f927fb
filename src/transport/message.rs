//! Wire messages exchanged by lock managers.

use crate::node::ClusterNode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A protocol message sent from one lock manager to its peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LockMessage {
    /// `requester` asks for exclusive ownership of `lock`.
    ///
    /// `timeout_ms` bounds how long a current holder may keep the request
    /// queued; `None` means "as long as the round lasts".
    Acquire {
        lock: String,
        requester: ClusterNode,
        view_id: u64,
        timeout_ms: Option<u64>,
    },

    /// `holder` gives up ownership (or retracts a lost round).
    Release {
        lock: String,
        holder: ClusterNode,
        view_id: u64,
    },

    /// `holder` won a round; every member records it as owner.
    Acquired {
        lock: String,
        holder: ClusterNode,
        view_id: u64,
    },

    /// `requester` withdraws any request it has queued for `lock`.
    Cancel { lock: String, requester: ClusterNode },

    /// `holder` announces ownership after a membership change.
    Assert {
        lock: String,
        holder: ClusterNode,
        view_id: u64,
    },
}

impl LockMessage {
    pub fn lock(&self) -> &str {
        match self {
            LockMessage::Acquire { lock, .. }
            | LockMessage::Release { lock, .. }
            | LockMessage::Acquired { lock, .. }
            | LockMessage::Cancel { lock, .. }
            | LockMessage::Assert { lock, .. } => lock,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LockMessage::Acquire { .. } => "acquire",
            LockMessage::Release { .. } => "release",
            LockMessage::Acquired { .. } => "acquired",
            LockMessage::Cancel { .. } => "cancel",
            LockMessage::Assert { .. } => "assert",
        }
    }

    /// Acquire requests may block at the receiver; everything else is a
    /// notification answered immediately.
    pub fn may_block(&self) -> bool {
        matches!(self, LockMessage::Acquire { .. })
    }

    pub(crate) fn timeout_ms(timeout: Option<Duration>) -> Option<u64> {
        timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Answer of one member to a [`LockMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum LockResponse {
    /// No objection: the requester may take the lock as far as this member knows.
    Ok,

    /// The request conflicts with `holder` (current owner or a superior competitor).
    Reject { holder: ClusterNode },

    /// The request carried a different view-id than the receiver's.
    StaleView { view_id: u64 },

    /// No lock service is running at the receiver.
    Unavailable,

    /// Notification received.
    Ack,
}

impl LockResponse {
    /// Whether this answer lets an acquisition round proceed.
    pub fn is_no_objection(&self) -> bool {
        matches!(self, LockResponse::Ok | LockResponse::Unavailable)
    }
}

/// One member's reply collected by a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberResponse {
    pub member: ClusterNode,

    /// `None` when the member could not be reached or did not answer in time.
    pub response: Option<LockResponse>,
}

impl MemberResponse {
    pub fn new(member: ClusterNode, response: Option<LockResponse>) -> Self {
        Self { member, response }
    }

    pub fn unreachable(member: ClusterNode) -> Self {
        Self {
            member,
            response: None,
        }
    }
}
