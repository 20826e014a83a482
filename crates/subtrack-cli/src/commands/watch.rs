//! Foreground run of the status refresh and reminder scan loops

use anyhow::{Context, Result};
use subtrack_core::{Session, SyncState};
use tracing::info;

pub async fn cmd_watch(session: &Session) -> Result<()> {
    let config = session.config();
    println!(
        "👀 Watching {} subscriptions for '{}' (refresh every {}s, reminders every {}s)",
        session.state().subscriptions.len(),
        session.user_id(),
        config.refresh_interval.as_secs(),
        config.reminder_scan_interval.as_secs()
    );
    if !session.has_backend() {
        println!("   💡 Tip: Set OLLAMA_HOST to draft renewal reminders automatically");
    }
    println!("   Press Ctrl-C to stop.");

    let mut sync_rx = session.subscribe_sync();
    session.start_background();

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            Ok(()) = sync_rx.changed() => {
                if let SyncState::Failed { message, .. } = sync_rx.borrow_and_update().clone() {
                    println!("⚠️  Not saved: {}", message);
                }
            }
        }
    }

    println!();
    info!("Stopping background tasks");
    session.stop_background().await;
    if !session.sync().await {
        println!("⚠️  Final save failed: changes since the last save are lost");
    }
    Ok(())
}
