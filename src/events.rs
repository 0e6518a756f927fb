//! Lock event journal.
//!
//! Lock managers can record what happened to their locks in an append-only
//! NDJSON file (one JSON object per line). The journal is an audit aid: a
//! failure to write it is logged and otherwise ignored, it never fails a lock
//! operation.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: What happened (acquired, released, yielded, ...)
//! - `node`: The member that recorded the event
//! - `lock`: Optional lock name for lock-specific events
//! - `details`: Freeform object with action-specific details
//!
//! ```no_run
//! use clusterlock::events::{LockEvent, EventAction, append_event};
//! use clusterlock::node::ClusterNode;
//! use serde_json::json;
//!
//! let event = LockEvent::new(EventAction::Acquired, &ClusterNode::new("node-1"))
//!     .with_lock("session-42")
//!     .with_details(json!({"rounds": 1}));
//! append_event("events.ndjson", &event)?;
//! # Ok::<(), clusterlock::error::LockError>(())
//! ```

use crate::error::{LockError, Result};
use crate::node::ClusterNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Actions that can be journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Manager joined the lock service.
    Started,
    /// Manager left the lock service.
    Stopped,
    /// Lock ownership taken by this node.
    Acquired,
    /// Lock ownership given up by this node.
    Released,
    /// Ownership handed to a queued remote requester.
    Yielded,
    /// Ownership of a departed member cleared.
    Reclaimed,
    /// Duplicate ownership after a partition merge resolved.
    SplitBrainResolved,
    /// A caller gave up waiting.
    TimedOut,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Started => write!(f, "started"),
            EventAction::Stopped => write!(f, "stopped"),
            EventAction::Acquired => write!(f, "acquired"),
            EventAction::Released => write!(f, "released"),
            EventAction::Yielded => write!(f, "yielded"),
            EventAction::Reclaimed => write!(f, "reclaimed"),
            EventAction::SplitBrainResolved => write!(f, "split_brain_resolved"),
            EventAction::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// One journal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    pub action: EventAction,

    /// The member that recorded the event.
    pub node: ClusterNode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,

    pub details: Value,
}

impl LockEvent {
    pub fn new(action: EventAction, node: &ClusterNode) -> Self {
        Self {
            ts: Utc::now(),
            action,
            node: node.clone(),
            lock: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_lock(mut self, lock: impl Into<String>) -> Self {
        self.lock = Some(lock.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| LockError::Codec(format!("failed to serialize event to JSON: {}", e)))
    }
}

/// Append an event to the NDJSON file at `path`.
///
/// The parent directory and the file are created when missing. Each append
/// writes exactly one line and syncs the file.
pub fn append_event(path: impl AsRef<Path>, event: &LockEvent) -> Result<()> {
    let path = path.as_ref();
    let json_line = event.to_ndjson_line()?;

    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        fs::create_dir_all(dir).map_err(|e| {
            LockError::Config(format!(
                "failed to create events directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            LockError::Config(format!(
                "failed to open events file '{}': {}",
                path.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        LockError::Config(format!(
            "failed to write event to '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        LockError::Config(format!(
            "failed to sync events file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(())
}

/// Read all events back from an NDJSON file, skipping blank lines.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<LockEvent>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        LockError::Config(format!(
            "failed to read events file '{}': {}",
            path.display(),
            e
        ))
    })?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| LockError::Codec(format!("invalid event line: {}", e)))
        })
        .collect()
}

/// Best-effort journal owned by one lock manager.
#[derive(Debug, Clone, Default)]
pub struct EventJournal {
    path: Option<PathBuf>,
}

impl EventJournal {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append `event`, logging instead of failing on errors.
    pub fn record(&self, event: LockEvent) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = append_event(path, &event) {
            tracing::warn!(
                error = %e,
                action = %event.action,
                "failed to journal lock event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn node() -> ClusterNode {
        ClusterNode::new("node-1")
    }

    #[test]
    fn test_event_creation() {
        let event = LockEvent::new(EventAction::Started, &node());

        assert_eq!(event.action, EventAction::Started);
        assert_eq!(event.node, node());
        assert!(event.lock.is_none());
        let age = Utc::now().signed_duration_since(event.ts);
        assert!(age.num_minutes() < 1);
    }

    #[test]
    fn test_event_with_lock_and_details() {
        let event = LockEvent::new(EventAction::Yielded, &node())
            .with_lock("bean-3")
            .with_details(json!({"to": "node-2"}));

        assert_eq!(event.lock.as_deref(), Some("bean-3"));
        assert_eq!(event.details["to"], "node-2");
    }

    #[test]
    fn test_event_serialization() {
        let event = LockEvent::new(EventAction::SplitBrainResolved, &node()).with_lock("L");
        let json_line = event.to_ndjson_line().unwrap();

        assert!(!json_line.contains('\n'));
        assert!(json_line.contains("\"split_brain_resolved\""));
        assert!(json_line.contains("\"node\":\"node-1\""));

        let parsed: LockEvent = serde_json::from_str(&json_line).unwrap();
        assert_eq!(parsed.action, EventAction::SplitBrainResolved);
    }

    #[test]
    fn test_event_without_lock_omits_field() {
        let event = LockEvent::new(EventAction::Stopped, &node());
        let parsed: Value = serde_json::from_str(&event.to_ndjson_line().unwrap()).unwrap();
        assert!(parsed.get("lock").is_none());
    }

    #[test]
    fn test_action_display_matches_serde() {
        for action in [
            EventAction::Acquired,
            EventAction::Released,
            EventAction::Reclaimed,
            EventAction::TimedOut,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action));
        }
    }

    #[test]
    fn test_append_event_creates_file_and_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("events.ndjson");

        append_event(&path, &LockEvent::new(EventAction::Started, &node())).unwrap();
        append_event(
            &path,
            &LockEvent::new(EventAction::Acquired, &node()).with_lock("L"),
        )
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let events = read_events(&path).unwrap();
        assert_eq!(events[0].action, EventAction::Started);
        assert_eq!(events[1].lock.as_deref(), Some("L"));
    }

    #[test]
    fn test_disabled_journal_writes_nothing() {
        let journal = EventJournal::disabled();
        assert!(journal.path().is_none());
        journal.record(LockEvent::new(EventAction::Started, &node()));
    }

    #[test]
    fn test_journal_failure_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let journal = EventJournal::new(Some(temp_dir.path().to_path_buf()));
        journal.record(LockEvent::new(EventAction::Started, &node()));
    }
}
