//! Snapshot file commands (export, import)

use std::path::Path;

use anyhow::{Context, Result};
use subtrack_core::{JsonFileStore, Session};

use super::warn_if_unsaved;

pub fn cmd_export(session: &Session, file: &Path) -> Result<()> {
    let snapshot = session.export_snapshot();
    JsonFileStore::write_file(file, &snapshot)
        .with_context(|| format!("Failed to write {}", file.display()))?;

    println!(
        "📦 Exported {} subscriptions and {} reminders to {}",
        snapshot.subscriptions.len(),
        snapshot.reminder_logs.len(),
        file.display()
    );
    Ok(())
}

pub async fn cmd_import(session: &Session, file: &Path) -> Result<()> {
    let snapshot = JsonFileStore::read_file(file)
        .with_context(|| format!("Failed to read snapshot {}", file.display()))?;
    let logs = snapshot.reminder_logs.len();
    let count = session
        .import_snapshot(snapshot)
        .await
        .context("Failed to import snapshot")?;

    println!("📥 Imported {} subscriptions and {} reminders", count, logs);
    warn_if_unsaved(session);
    Ok(())
}
