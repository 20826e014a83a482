//! SQLite snapshot store with connection pooling and SQLCipher encryption

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::{Snapshot, SnapshotStore};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable holding the database passphrase
pub const DB_KEY_ENV: &str = "SUBTRACK_DB_KEY";

/// Derive a SQLCipher key from a passphrase with Argon2id
///
/// The salt is fixed so the same passphrase opens the database wherever the
/// file is moved.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"subtrack-salt-v1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let output = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(output.as_bytes()))
}

/// Pooled SQLite database holding one snapshot row per user
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
    encrypted: bool,
}

impl Database {
    /// Open an encrypted database
    ///
    /// Fails when `SUBTRACK_DB_KEY` is unset; use [`Database::new_unencrypted`]
    /// for development.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV) {
            Ok(key) if !key.is_empty() => Self::new_with_key(path, Some(&key)),
            _ => Err(Error::Encryption(format!(
                "Database encryption required. Set {} with your passphrase, \
                or use --no-encrypt for an unencrypted database.",
                DB_KEY_ENV
            ))),
        }
    }

    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = match passphrase {
            Some(pass) => {
                let key_pragma = format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?);
                let manager = manager.with_init(move |conn| conn.execute_batch(&key_pragma));
                Pool::builder().max_size(4).build(manager)?
            }
            None => Pool::builder().max_size(4).build(manager)?,
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
            encrypted: passphrase.is_some(),
        };
        db.run_migrations()?;

        info!(path = %path, encrypted = db.encrypted, "Opened snapshot database");
        Ok(db)
    }

    /// Throwaway database for tests
    ///
    /// Uses a temp file rather than `:memory:` so every pooled connection
    /// sees the same data.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "subtrack_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path.to_string_lossy())
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            -- One JSON snapshot per user
            CREATE TABLE IF NOT EXISTS snapshots (
                user_id TEXT PRIMARY KEY,
                schema_version INTEGER NOT NULL,
                payload TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Stored snapshot for `user_id`
    pub fn load_snapshot(&self, user_id: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM snapshots WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        payload.map(|p| Snapshot::from_json(&p)).transpose()
    }

    /// Insert or replace the snapshot for `user_id`
    pub fn store_snapshot(&self, user_id: &str, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO snapshots (user_id, schema_version, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                schema_version = excluded.schema_version,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![
                user_id,
                snapshot.schema_version,
                payload,
                snapshot.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()
            ],
        )?;
        debug!(user = %user_id, subscriptions = snapshot.subscriptions.len(), "Stored snapshot");
        Ok(())
    }

    /// Last save time for `user_id`
    pub fn snapshot_updated_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT updated_at FROM snapshots WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|s| crate::lifecycle::parse_timestamp(&s)))
    }

    /// Users with a stored snapshot
    pub fn list_users(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT user_id FROM snapshots ORDER BY user_id")?;
        let users = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(users)
    }
}

#[async_trait]
impl SnapshotStore for Database {
    async fn fetch(&self, user_id: &str) -> Result<Option<Snapshot>> {
        let db = self.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || db.load_snapshot(&user_id))
            .await
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    async fn save(&self, user_id: &str, snapshot: &Snapshot) -> Result<()> {
        let db = self.clone();
        let user_id = user_id.to_string();
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || db.store_snapshot(&user_id, &snapshot))
            .await
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.db_path)
    }
}
