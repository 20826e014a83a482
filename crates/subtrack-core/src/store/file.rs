//! JSON file snapshot store
//!
//! One `<user>.json` per user under a directory. Writes go to a temp file in
//! the same directory and are renamed over the target, so a crash never
//! leaves a half-written snapshot.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

use super::{Snapshot, SnapshotStore};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for `user_id`
    pub fn path_for(&self, user_id: &str) -> Result<PathBuf> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
            && !user_id.starts_with('.');
        if !valid {
            return Err(Error::Validation(format!("invalid user id: {:?}", user_id)));
        }
        Ok(self.dir.join(format!("{}.json", user_id)))
    }

    /// Read a snapshot from an arbitrary file (used by `import`)
    pub fn read_file(path: &Path) -> Result<Snapshot> {
        let payload = std::fs::read_to_string(path)?;
        Snapshot::from_json(&payload)
    }

    /// Atomically write a snapshot to an arbitrary file (used by `export`)
    pub fn write_file(path: &Path, snapshot: &Snapshot) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(snapshot.to_json()?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<Snapshot>> {
        let path = self.path_for(user_id)?;
        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(None);
            }
            JsonFileStore::read_file(&path).map(Some)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    async fn save(&self, user_id: &str, snapshot: &Snapshot) -> Result<()> {
        let path = self.path_for(user_id)?;
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || {
            JsonFileStore::write_file(&path, &snapshot)?;
            debug!(path = %path.display(), "Wrote snapshot file");
            Ok(())
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    fn describe(&self) -> String {
        format!("json:{}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("snapshots"));

        assert!(store.fetch("local").await.unwrap().is_none());

        let snapshot = Snapshot::new(Vec::new(), Vec::new(), Utc::now());
        store.save("local", &snapshot).await.unwrap();
        assert!(dir.path().join("snapshots/local.json").exists());
        assert_eq!(store.fetch("local").await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_json_store_rejects_path_like_user_ids() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for(".hidden").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("alice@example.com").is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        std::fs::write(dir.path().join("local.json"), "{ not json").unwrap();
        assert!(store.fetch("local").await.is_err());
    }
}
