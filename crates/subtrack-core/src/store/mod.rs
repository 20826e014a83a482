//! Snapshot persistence
//!
//! The whole portfolio is stored as one JSON document per user. Stores are
//! best-effort: callers record failures and carry on.
//!
//! - `sqlite` - encrypted SQLite table keyed by user id
//! - `JsonFileStore` - one file per user, written atomically
//! - `MemoryStore` - in-process map for tests

mod file;
mod sqlite;

pub use file::JsonFileStore;
pub use sqlite::{Database, DB_KEY_ENV};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{ReminderLog, Subscription};

/// Newest snapshot layout this build understands
pub const SCHEMA_VERSION: u32 = 1;

/// Everything persisted for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub reminder_logs: Vec<ReminderLog>,
    /// Older front ends wrote a `version` string such as `"1.0.0"`
    #[serde(
        default = "default_schema_version",
        alias = "version",
        deserialize_with = "lenient_schema_version"
    )]
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Number(u32),
    Text(String),
}

/// Accept `1` or a dotted string; the major component is the schema version
fn lenient_schema_version<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match RawVersion::deserialize(deserializer)? {
        RawVersion::Number(n) => Ok(n),
        RawVersion::Text(text) => text
            .trim()
            .trim_start_matches(|c: char| c == 'v' || c == 'V')
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
            .ok_or_else(|| {
                serde::de::Error::custom(format!("unrecognized snapshot version '{}'", text))
            }),
    }
}

impl Snapshot {
    pub fn new(
        subscriptions: Vec<Subscription>,
        reminder_logs: Vec<ReminderLog>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subscriptions,
            reminder_logs,
            schema_version: SCHEMA_VERSION,
            updated_at,
        }
    }

    /// Parse and version-check a stored payload
    pub fn from_json(payload: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(payload)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject snapshots written by a newer build
    pub fn check_version(&self) -> Result<()> {
        if self.schema_version > SCHEMA_VERSION {
            return Err(Error::InvalidData(format!(
                "snapshot schema version {} is newer than supported version {}",
                self.schema_version, SCHEMA_VERSION
            )));
        }
        Ok(())
    }
}

/// Key-value persistence for portfolio snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest snapshot for `user_id`, `None` if nothing was stored yet
    async fn fetch(&self, user_id: &str) -> Result<Option<Snapshot>>;

    /// Replace the stored snapshot for `user_id`
    async fn save(&self, user_id: &str, snapshot: &Snapshot) -> Result<()>;

    /// Short label for logs
    fn describe(&self) -> String;
}

/// In-process store, mainly for tests
///
/// Clones share the same map. `set_failing(true)` makes every call error.
#[derive(Clone, Default)]
pub struct MemoryStore {
    snapshots: Arc<Mutex<HashMap<String, Snapshot>>>,
    failing: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Stored snapshot without going through the async API
    pub fn get(&self, user_id: &str) -> Option<Snapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }

    pub fn insert(&self, user_id: &str, snapshot: Snapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string(), snapshot);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store is set to fail",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<Snapshot>> {
        self.check()?;
        match self.get(user_id) {
            Some(snapshot) => {
                snapshot.check_version()?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, user_id: &str, snapshot: &Snapshot) -> Result<()> {
        self.check()?;
        self.insert(user_id, snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_layout() {
        let snapshot = Snapshot::new(Vec::new(), Vec::new(), Utc::now());
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
        assert!(value["reminderLogs"].is_array());
        assert!(value.get("updatedAt").is_some());
    }

    #[test]
    fn test_snapshot_accepts_legacy_version_field() {
        let payload = r#"{"subscriptions": [], "reminderLogs": [], "version": 1, "updatedAt": "2024-06-01T00:00:00Z"}"#;
        let snapshot = Snapshot::from_json(payload).unwrap();
        assert_eq!(snapshot.schema_version, 1);
    }

    #[test]
    fn test_snapshot_accepts_legacy_version_string() {
        let payload = r#"{"subscriptions": [], "reminderLogs": [], "version": "1.0.0", "updatedAt": "2024-06-01T00:00:00Z"}"#;
        let snapshot = Snapshot::from_json(payload).unwrap();
        assert_eq!(snapshot.schema_version, 1);

        let newer = payload.replace("1.0.0", "2.1");
        assert!(matches!(Snapshot::from_json(&newer), Err(Error::InvalidData(_))));

        let garbage = payload.replace("1.0.0", "beta");
        assert!(matches!(Snapshot::from_json(&garbage), Err(Error::Json(_))));
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let payload = format!(
            r#"{{"subscriptions": [], "reminderLogs": [], "schemaVersion": {}, "updatedAt": "2024-06-01T00:00:00Z"}}"#,
            SCHEMA_VERSION + 1
        );
        assert!(matches!(Snapshot::from_json(&payload), Err(Error::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_memory_store_round_trip_and_failure() {
        let store = MemoryStore::new();
        assert!(store.fetch("alice").await.unwrap().is_none());

        let snapshot = Snapshot::new(Vec::new(), Vec::new(), Utc::now());
        store.save("alice", &snapshot).await.unwrap();
        assert_eq!(store.fetch("alice").await.unwrap(), Some(snapshot.clone()));
        assert!(store.fetch("bob").await.unwrap().is_none());

        store.set_failing(true);
        assert!(store.fetch("alice").await.is_err());
        assert!(store.save("alice", &snapshot).await.is_err());
        assert_eq!(store.save_count(), 1);
    }
}
