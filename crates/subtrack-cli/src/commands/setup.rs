//! Setup command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `open_session` - Open the database and log in the selected user
//! - `cmd_init` - Initialize the database

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::debug;
use subtrack_core::{
    AppConfig, Database, DraftBackend, DraftClient, LoginOutcome, Session, SystemClock,
};

/// Global flags every session-backed command needs
pub struct SessionArgs<'a> {
    pub db: &'a Path,
    pub user: &'a str,
    pub config: Option<&'a Path>,
    pub no_encrypt: bool,
}

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Open the store, pick the AI backend from the environment and load the user
///
/// A snapshot that cannot be read is an error here: carrying on with an
/// empty portfolio would overwrite it on the next save.
pub async fn open_session(args: &SessionArgs<'_>) -> Result<Session> {
    let config = AppConfig::load(args.config).context("Failed to load config")?;
    let db = open_db(args.db, args.no_encrypt)?;
    let backend = DraftClient::from_env().map(|c| Arc::new(c) as Arc<dyn DraftBackend>);

    let session = Session::new(args.user, Arc::new(db), backend, Arc::new(SystemClock), config);
    if let LoginOutcome::FetchFailed(e) = session.login().await {
        bail!("Could not load the snapshot for '{}': {}", args.user, e);
    }
    debug!(user = %args.user, store = %session.describe_store(), "Session opened");
    Ok(session)
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;
    let users = db.list_users().context("Failed to read snapshots")?;
    println!("   Stored portfolios: {}", users.len());

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add a subscription: subtrack add -n Netflix -p 15.49 --ends 2025-01-01");
    println!("  2. Get renewal reminders: OLLAMA_HOST=http://localhost:11434 subtrack watch");

    Ok(())
}
