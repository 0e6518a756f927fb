//! Clusterlock: cluster-wide named locks over a group transport.
//!
//! Every member of a cluster runs a [`locks::ClusterLockManager`]. Members
//! negotiate ownership of named locks by exchanging protocol messages through a
//! [`transport::GroupTransport`], and react to membership changes so that
//! locks held by departed members are reclaimed.
//!
//! The [`transport::InMemoryNetwork`] runs a whole cluster inside one process;
//! the `clusterlock simulate` command and the test suite use it.

pub mod config;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod locks;
pub mod node;
pub mod transport;

#[cfg(test)]
mod test_support;
