//! Cluster member identity and membership views.
//!
//! A [`View`] is the ordered list of live members agreed on by the transport,
//! tagged with a monotonically increasing view-id. The order matters: a member
//! earlier in the view is *superior* to a later one, which is the tie-break the
//! lock protocol uses when two members compete for the same lock.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Stable identity of one cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterNode(String);

impl ClusterNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Identity derived from the environment (`user@HOST`).
    pub fn from_environment() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self(format!("{}@{}", user, host))
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterNode {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Membership view: the ordered set of live members plus its view-id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Monotonically increasing view number. `0` means "no view yet".
    pub view_id: u64,

    /// Live members, most senior first.
    pub members: Vec<ClusterNode>,
}

impl View {
    pub fn new(view_id: u64, members: Vec<ClusterNode>) -> Self {
        Self { view_id, members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, node: &ClusterNode) -> bool {
        self.members.contains(node)
    }

    pub fn position(&self, node: &ClusterNode) -> Option<usize> {
        self.members.iter().position(|m| m == node)
    }

    /// The most senior member, if any.
    pub fn coordinator(&self) -> Option<&ClusterNode> {
        self.members.first()
    }

    /// Returns true if `a` wins a tie-break against `b`.
    ///
    /// Members earlier in the view win. If either member is not in this view
    /// the identities are compared lexicographically, so the answer is still
    /// a total order.
    pub fn is_superior(&self, a: &ClusterNode, b: &ClusterNode) -> bool {
        if a == b {
            return false;
        }
        match (self.position(a), self.position(b)) {
            (Some(pa), Some(pb)) => pa < pb,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => a < b,
        }
    }

    /// Members of `previous` that are not in this view.
    pub fn departed_since(&self, previous: &View) -> Vec<ClusterNode> {
        let current: HashSet<&ClusterNode> = self.members.iter().collect();
        previous
            .members
            .iter()
            .filter(|m| !current.contains(m))
            .cloned()
            .collect()
    }

    /// Members of this view that were not in `previous`.
    pub fn joined_since(&self, previous: &View) -> Vec<ClusterNode> {
        let before: HashSet<&ClusterNode> = previous.members.iter().collect();
        self.members
            .iter()
            .filter(|m| !before.contains(m))
            .cloned()
            .collect()
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.members.iter().map(|m| m.name()).collect();
        write!(f, "[{}] {{{}}}", self.view_id, names.join(", "))
    }
}

/// Name under which a lock manager is installed on the transport.
///
/// Keyed by `(cluster_name, service)`, where the service is normally `"lock"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName {
    pub cluster_name: String,
    pub service: String,
}

impl ServiceName {
    pub const DEFAULT_SERVICE: &'static str = "lock";

    pub fn new(cluster_name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            service: service.into(),
        }
    }

    /// The lock service of the given cluster.
    pub fn lock_service(cluster_name: impl Into<String>) -> Self {
        Self::new(cluster_name, Self::DEFAULT_SERVICE)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster_name, self.service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn view(id: u64, names: &[&str]) -> View {
        View::new(id, names.iter().map(|n| ClusterNode::new(*n)).collect())
    }

    #[test]
    fn test_superiority_follows_view_order() {
        let v = view(3, &["c", "a", "b"]);
        let (a, b, c) = (
            ClusterNode::new("a"),
            ClusterNode::new("b"),
            ClusterNode::new("c"),
        );

        assert!(v.is_superior(&c, &a));
        assert!(v.is_superior(&a, &b));
        assert!(!v.is_superior(&b, &c));
        assert!(!v.is_superior(&a, &a));
        assert_eq!(v.coordinator(), Some(&c));
    }

    #[test]
    fn test_superiority_outside_view_is_total() {
        let v = view(1, &["m"]);
        let m = ClusterNode::new("m");
        let x = ClusterNode::new("x");
        let y = ClusterNode::new("y");

        assert!(v.is_superior(&m, &x));
        assert!(!v.is_superior(&x, &m));
        assert!(v.is_superior(&x, &y));
        assert!(!v.is_superior(&y, &x));
    }

    #[test]
    fn test_departed_and_joined() {
        let old = view(1, &["a", "b", "c"]);
        let new = view(2, &["a", "c", "d"]);

        assert_eq!(new.departed_since(&old), vec![ClusterNode::new("b")]);
        assert_eq!(new.joined_since(&old), vec![ClusterNode::new("d")]);
        assert!(old.departed_since(&old).is_empty());
    }

    #[test]
    fn test_view_display() {
        let v = view(7, &["a", "b"]);
        assert_eq!(v.to_string(), "[7] {a, b}");
    }

    #[test]
    fn test_service_name_display() {
        let service = ServiceName::lock_service("web-sessions");
        assert_eq!(service.service, "lock");
        assert_eq!(service.to_string(), "web-sessions/lock");
    }

    #[test]
    fn test_node_serializes_as_plain_string() {
        let node = ClusterNode::new("node-1");
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, "\"node-1\"");
    }

    #[test]
    #[serial]
    fn test_node_from_environment_uses_user() {
        let previous = std::env::var("USER").ok();
        // SAFETY: serialized with the other environment tests.
        unsafe { std::env::set_var("USER", "locktester") };

        let node = ClusterNode::from_environment();
        assert!(node.name().starts_with("locktester@"));

        match previous {
            Some(user) => unsafe { std::env::set_var("USER", user) },
            None => unsafe { std::env::remove_var("USER") },
        }
    }
}
