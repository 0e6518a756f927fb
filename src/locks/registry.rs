//! Lock name to [`LockState`] mapping.
//!
//! The registry is an explicitly owned object handed to the manager, so tests
//! can run several independent managers in one process. Entries are created
//! lazily and evicted once idle. An evicted entry is flagged `invalid`; anyone
//! still holding its `Arc` notices the flag under the entry's mutex and fetches
//! a fresh one.

use super::state::LockState;
use crate::error::{LockError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;

/// One registry slot: the state plus the condition its waiters block on.
#[derive(Debug)]
pub struct LockEntry {
    pub name: String,
    pub state: Mutex<LockState>,
    pub changed: Condvar,
}

impl LockEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(LockState::new(name)),
            changed: Condvar::new(),
        }
    }

    /// Wake everyone blocked on this entry.
    pub fn notify(&self) {
        self.changed.notify_all();
    }
}

#[derive(Debug, Default)]
pub struct LockRegistry {
    entries: Mutex<HashMap<String, Arc<LockEntry>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the entry for `name`, creating it if needed.
    ///
    /// The flag is `true` when this call created the entry.
    pub fn get_or_create(&self, name: &str) -> (Arc<LockEntry>, bool) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(name) {
            return (Arc::clone(entry), false);
        }
        let entry = Arc::new(LockEntry::new(name));
        entries.insert(name.to_string(), Arc::clone(&entry));
        (entry, true)
    }

    pub fn get(&self, name: &str) -> Option<Arc<LockEntry>> {
        self.entries.lock().get(name).cloned()
    }

    /// Remove `name`. Fails with `LockBusy` while the lock is owned, held,
    /// queued for or being negotiated.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(name) else {
            return Ok(());
        };
        {
            let mut state = entry.state.lock();
            if !state.is_idle() {
                return Err(LockError::LockBusy(name.to_string()));
            }
            state.invalid = true;
        }
        entries.remove(name);
        Ok(())
    }

    /// Remove `name` if it is idle. Returns whether it was removed.
    pub fn evict_if_idle(&self, name: &str) -> bool {
        self.remove(name).is_ok() && !self.contains(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<Arc<LockEntry>> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry, marking each invalid.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        for entry in entries.values() {
            entry.state.lock().invalid = true;
            entry.notify();
        }
        entries.clear();
    }
}
