//! Exit code constants for the clusterlock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config, misuse of the lock API)
//! - 2: Safety violation observed during a simulation
//! - 3: Transport failure
//! - 4: Lock acquisition failure (timeout or manager stopped)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or lock API misuse.
pub const USER_ERROR: i32 = 1;

/// A simulation observed two members holding the same lock at once.
pub const SAFETY_VIOLATION: i32 = 2;

/// The group transport failed to deliver a message.
pub const TRANSPORT_FAILURE: i32 = 3;

/// Lock acquisition failure: timed out or the manager was stopped.
pub const LOCK_FAILURE: i32 = 4;
