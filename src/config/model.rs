//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one cluster lock manager.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Identity
    // =========================================================================
    /// Cluster the lock service belongs to (first half of the service key).
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Service name the manager registers on the transport (default: "lock").
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Name of the local member. When unset the transport's identity is used,
    /// and standalone tools fall back to `user@HOST`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    // =========================================================================
    // Protocol timings
    // =========================================================================
    /// Upper bound for one acquisition round across the cluster.
    #[serde(default = "default_method_call_timeout_ms")]
    pub method_call_timeout_ms: u64,

    /// First backoff after a lost round.
    #[serde(default = "default_retry_backoff_min_ms")]
    pub retry_backoff_min_ms: u64,

    /// Largest backoff after repeated lost rounds.
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    /// Extra lifetime of a provisional grant beyond the requester's round.
    #[serde(default = "default_grant_expiry_slack_ms")]
    pub grant_expiry_slack_ms: u64,

    // =========================================================================
    // Ownership
    // =========================================================================
    /// What happens to cluster ownership after the last local unlock.
    #[serde(default)]
    pub release_policy: ReleasePolicy,

    /// Whether fully released, idle locks are dropped from the registry.
    #[serde(default = "default_true")]
    pub evict_idle_locks: bool,

    // =========================================================================
    // Journal
    // =========================================================================
    /// NDJSON file that receives lock events (disabled when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            service_name: default_service_name(),
            node_name: None,
            method_call_timeout_ms: default_method_call_timeout_ms(),
            retry_backoff_min_ms: default_retry_backoff_min_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            grant_expiry_slack_ms: default_grant_expiry_slack_ms(),
            release_policy: ReleasePolicy::default(),
            evict_idle_locks: default_true(),
            event_log: None,
        }
    }
}
