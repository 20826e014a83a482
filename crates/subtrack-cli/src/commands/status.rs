//! Status command: database, encryption, AI backend and sync state

use anyhow::Result;
use subtrack_core::{
    reminders::eligible, store::DB_KEY_ENV, AppConfig, DraftBackend, DraftClient, SyncState,
};

use super::{open_db, open_session, SessionArgs};

pub async fn cmd_status(args: &SessionArgs<'_>) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 SubTrack Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", args.db.display());
    println!("   User: {}", args.user);

    if args.db.exists() {
        if let Ok(metadata) = fs::metadata(args.db) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if args.no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    match AppConfig::load(args.config) {
        Ok(config) => {
            println!(
                "   Schedule: refresh {}s, reminder scan {}s, sync on status change: {}",
                config.refresh_interval.as_secs(),
                config.reminder_scan_interval.as_secs(),
                if config.sync_on_status_change { "yes" } else { "no" }
            );
        }
        Err(e) => println!("   ❌ Config: {}", e),
    }

    println!();
    match DraftClient::from_env() {
        Some(client) => {
            let healthy = client.health_check().await;
            println!(
                "   🤖 AI backend: {} ({} @ {}) {}",
                client.kind(),
                client.model(),
                client.host(),
                if healthy { "✅ reachable" } else { "❌ unreachable" }
            );
        }
        None => {
            println!("   🤖 AI backend: not configured");
            println!("      Set OLLAMA_HOST (or AI_BACKEND=openai_compatible + OPENAI_COMPATIBLE_HOST)");
        }
    }

    if args.db.exists() {
        // Read before logging in, which saves again
        let previous_save = open_db(args.db, args.no_encrypt)
            .ok()
            .and_then(|db| db.snapshot_updated_at(args.user).ok().flatten());

        match open_session(args).await {
            Ok(session) => {
                let stats = session.analytics();
                let awaiting = eligible(&session.state(), session.clock().now()).len();
                println!();
                println!("   Subscriptions: {}", stats.subscription_count);
                println!("   Expiring soon: {}", stats.expiring_count);
                println!("   Awaiting reminder: {}", awaiting);
                println!("   Reminders sent: {}", session.state().reminder_logs.len());
                match previous_save {
                    Some(at) => println!("   Previously saved: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                    None => println!("   Previously saved: never"),
                }
                if let SyncState::Failed { message, .. } = session.sync_state() {
                    println!("   ❌ Save failed: {}", message);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {:#}", e);
                if !args.no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}
