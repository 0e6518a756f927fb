//! Configuration types and defaults for clusterlock.
//!
//! This module defines enums, constants, and default value functions
//! used by the Config struct.

use serde::{Deserialize, Serialize};

/// What a node does with cluster ownership once its last local hold is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// Give ownership up and broadcast a release (default).
    #[default]
    Release,
    /// Keep ownership and yield it only when another member asks for it.
    Retain,
}

impl ReleasePolicy {
    /// Parse a release policy from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "release" => Some(Self::Release),
            "retain" => Some(Self::Retain),
            _ => None,
        }
    }
}

// Default value functions for serde
pub(crate) fn default_cluster_name() -> String {
    "default".to_string()
}
pub(crate) fn default_service_name() -> String {
    crate::node::ServiceName::DEFAULT_SERVICE.to_string()
}
pub(crate) fn default_method_call_timeout_ms() -> u64 {
    60_000
}
pub(crate) fn default_retry_backoff_min_ms() -> u64 {
    10
}
pub(crate) fn default_retry_backoff_max_ms() -> u64 {
    500
}
pub(crate) fn default_grant_expiry_slack_ms() -> u64 {
    1_000
}
pub(crate) fn default_true() -> bool {
    true
}
