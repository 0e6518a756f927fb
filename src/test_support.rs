//! Multi-member cluster harness for tests.

use crate::config::Config;
use crate::locks::{ClusterLockManager, LockRegistry};
use crate::node::ClusterNode;
use crate::transport::InMemoryNetwork;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Config with short timings so protocol tests finish quickly.
pub(crate) fn fast_config() -> Config {
    Config {
        cluster_name: "test".to_string(),
        method_call_timeout_ms: 2_000,
        retry_backoff_min_ms: 2,
        retry_backoff_max_ms: 40,
        grant_expiry_slack_ms: 500,
        ..Config::default()
    }
}

pub(crate) struct Member {
    pub node: ClusterNode,
    pub manager: ClusterLockManager,
}

pub(crate) struct TestCluster {
    pub network: Arc<InMemoryNetwork>,
    pub members: Vec<Member>,
}

impl TestCluster {
    /// Join all `names` (in order) and start a manager on each.
    pub(crate) fn start(names: &[&str]) -> Self {
        Self::start_with(names, |_| fast_config())
    }

    /// Like [`start`](Self::start) with a per-member config.
    pub(crate) fn start_with(names: &[&str], config_for: impl Fn(&str) -> Config) -> Self {
        let network = InMemoryNetwork::new();
        let transports: Vec<_> = names
            .iter()
            .map(|name| network.join(*name).unwrap())
            .collect();

        let members = names
            .iter()
            .zip(transports)
            .map(|(name, transport)| {
                let manager = ClusterLockManager::new(
                    config_for(name),
                    transport,
                    Arc::new(LockRegistry::new()),
                )
                .unwrap();
                manager.start().unwrap();
                Member {
                    node: ClusterNode::new(*name),
                    manager,
                }
            })
            .collect();

        Self { network, members }
    }

    pub(crate) fn manager(&self, name: &str) -> &ClusterLockManager {
        &self.member(name).manager
    }

    pub(crate) fn member(&self, name: &str) -> &Member {
        self.members
            .iter()
            .find(|m| m.node.name() == name)
            .unwrap_or_else(|| panic!("no member named {}", name))
    }

    pub(crate) fn crash(&self, name: &str) {
        self.network.crash(&ClusterNode::new(name));
    }

    pub(crate) fn stop_all(&self) {
        for member in &self.members {
            member.manager.stop();
        }
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
