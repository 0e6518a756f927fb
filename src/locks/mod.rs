//! Cluster-wide locking.
//!
//! This module implements named, exclusive locks shared by the members of a
//! cluster:
//! - [`ClusterLockManager`]: public API and acquisition protocol
//! - [`LockRegistry`]: per-member lock name to [`LockState`] map
//! - [`ViewChangeHandler`]: reclaims locks of departed members and resolves
//!   duplicate ownership after partitions heal
//!
//! # Ownership Model
//!
//! At most one member owns a lock at any time. Inside the owning member the
//! lock is *shared local*: any [`LockContext`] may hold it, each with its own
//! re-entrancy count, without another cluster round. A member that wants the
//! lock while another one owns it asks the owner, which *yields* once its
//! local holds drop to zero.
//!
//! # RAII Guards
//!
//! [`ClusterLockManager::acquire`] returns a [`LockGuard`] that unlocks when
//! dropped. If unlocking fails during drop, a warning is logged but the
//! program does not crash.

mod context;
mod guard;
mod manager;
mod protocol;
mod registry;
mod state;
mod types;
mod view;


// Re-export public API
pub use context::LockContext;
pub use guard::LockGuard;
pub use manager::ClusterLockManager;
pub use registry::{LockEntry, LockRegistry};
pub use state::{LockState, PendingGrant, Requester};
pub use types::{LockInfo, LockResult};
pub use view::ViewChangeHandler;
