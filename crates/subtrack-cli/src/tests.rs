//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use clap::Parser;
use subtrack_core::{
    AppConfig, BillingCycle, DraftBackend, ManualClock, MemoryStore, MockBackend, Session,
    SyncState,
};

use crate::cli::{Cli, Commands, RemindAction};
use crate::commands::{self, short_id, truncate, AddForm};

fn setup_session(store: &MemoryStore, backend: Option<MockBackend>) -> Session {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap());
    Session::new(
        "local",
        Arc::new(store.clone()),
        backend.map(|b| Arc::new(b) as Arc<dyn DraftBackend>),
        Arc::new(clock),
        AppConfig::default(),
    )
}

fn form(name: &str, price: f64, ends: &str) -> AddForm {
    AddForm {
        name: Some(name.to_string()),
        price: Some(price),
        ends: Some(ends.to_string()),
        ..Default::default()
    }
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_global_flags() {
    let cli = Cli::try_parse_from([
        "subtrack", "--db", "x.db", "--user", "bob", "--no-encrypt", "list",
    ])
    .unwrap();
    assert_eq!(cli.user, "bob");
    assert!(cli.no_encrypt);
    assert!(matches!(cli.command, Commands::List { status: None }));
}

#[test]
fn test_parse_remind_mailto() {
    let cli = Cli::try_parse_from(["subtrack", "remind", "mailto", "abc", "--to", "me@x.org"]).unwrap();
    match cli.command {
        Commands::Remind {
            action: RemindAction::Mailto { id, to },
        } => {
            assert_eq!(id.as_deref(), Some("abc"));
            assert_eq!(to.as_deref(), Some("me@x.org"));
        }
        _ => panic!("expected remind mailto"),
    }
}

#[test]
fn test_parse_add_describe() {
    let cli = Cli::try_parse_from(["subtrack", "add", "--describe", "Netflix 15.49 monthly"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Add { describe: Some(_), name: None, .. }
    ));
}

// ========== Subscription Command Tests ==========

#[tokio::test]
async fn test_cmd_add_and_list() {
    let store = MemoryStore::new();
    let session = setup_session(&store, None);
    session.login().await;

    let mut f = form("Netflix", 15.49, "2024-07-01");
    f.cycle = Some("Monthly".into());
    f.currency = Some("usd".into());
    commands::cmd_add(&session, f).await.unwrap();

    let state = session.state();
    assert_eq!(state.subscriptions.len(), 1);
    assert_eq!(state.subscriptions[0].currency, "USD");
    assert_eq!(
        state.subscriptions[0].end_date,
        Some(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(store.get("local").unwrap().subscriptions.len(), 1);

    assert!(commands::cmd_list(&session, None).is_ok());
    assert!(commands::cmd_list(&session, Some("EXPIRING")).is_ok());
    assert!(commands::cmd_list(&session, Some("paused")).is_err());
}

#[tokio::test]
async fn test_cmd_add_rejects_bad_input() {
    let store = MemoryStore::new();
    let session = setup_session(&store, None);
    session.login().await;

    let mut bad_cycle = form("Netflix", 15.49, "2024-07-01");
    bad_cycle.cycle = Some("fortnightly".into());
    assert!(commands::cmd_add(&session, bad_cycle).await.is_err());

    assert!(commands::cmd_add(&session, form("Netflix", 15.49, "soon")).await.is_err());
    assert!(commands::cmd_add(&session, form("Netflix", -1.0, "2024-07-01")).await.is_err());
    assert!(commands::cmd_add(&session, AddForm::default()).await.is_err());
    assert!(session.state().is_empty());
}

#[tokio::test]
async fn test_cmd_add_describe_with_override() {
    let store = MemoryStore::new();
    let session = setup_session(&store, Some(MockBackend::new()));
    session.login().await;

    let f = AddForm {
        describe: Some("Spotify Family 16.99 monthly".into()),
        category: Some("Music".into()),
        ..Default::default()
    };
    commands::cmd_add(&session, f).await.unwrap();

    let sub = &session.state().subscriptions[0];
    assert_eq!(sub.name, "Spotify Family");
    assert_eq!(sub.price, 16.99);
    assert_eq!(sub.billing_cycle, BillingCycle::Monthly);
    assert_eq!(sub.category, "Music");
}

#[tokio::test]
async fn test_cmd_renew_and_delete_by_name() {
    let store = MemoryStore::new();
    let session = setup_session(&store, None);
    session.login().await;
    commands::cmd_add(&session, form("Hulu", 7.99, "2024-06-17")).await.unwrap();

    commands::cmd_renew(&session, "hulu").await.unwrap();
    assert_eq!(
        session.state().subscriptions[0].end_date,
        Some(Utc.with_ymd_and_hms(2024, 7, 17, 0, 0, 0).unwrap())
    );

    commands::cmd_delete(&session, "Hulu").await.unwrap();
    assert!(session.state().is_empty());
    assert!(commands::cmd_delete(&session, "Hulu").await.is_err());
}

#[tokio::test]
async fn test_unsaved_changes_are_reported_not_fatal() {
    let store = MemoryStore::new();
    let session = setup_session(&store, None);
    session.login().await;
    store.set_failing(true);

    commands::cmd_add(&session, form("Hulu", 7.99, "2024-07-17")).await.unwrap();
    assert!(matches!(session.sync_state(), SyncState::Failed { .. }));
}

// ========== Report Command Tests ==========

#[tokio::test]
async fn test_cmd_stats_and_analytics() {
    let store = MemoryStore::new();
    let session = setup_session(&store, None);
    session.login().await;

    assert!(commands::cmd_stats(&session).is_ok());
    commands::cmd_add(&session, form("Netflix", 15.49, "2024-07-01")).await.unwrap();
    let mut euro = form("Deezer", 9.99, "2024-06-16");
    euro.currency = Some("EUR".into());
    commands::cmd_add(&session, euro).await.unwrap();

    assert!(commands::cmd_stats(&session).is_ok());
    assert!(commands::cmd_analytics(&session, Some(7), false).is_ok());
    assert!(commands::cmd_analytics(&session, None, true).is_ok());
}

#[tokio::test]
async fn test_cmd_insights_requires_backend() {
    let store = MemoryStore::new();
    let session = setup_session(&store, None);
    session.login().await;
    commands::cmd_add(&session, form("Netflix", 15.49, "2024-07-01")).await.unwrap();
    assert!(commands::cmd_insights(&session).await.is_err());

    let session = setup_session(&store, Some(MockBackend::new()));
    session.login().await;
    assert!(commands::cmd_insights(&session).await.is_ok());
}

// ========== Reminder Command Tests ==========

#[tokio::test]
async fn test_cmd_remind_flow() {
    let store = MemoryStore::new();
    let session = setup_session(&store, Some(MockBackend::new()));
    session.login().await;
    commands::cmd_add(&session, form("Hulu", 7.99, "2024-06-17")).await.unwrap();

    assert!(commands::cmd_remind_mailto(&session, None, None).is_err());

    commands::cmd_remind_scan(&session).await.unwrap();
    commands::cmd_remind_summary(&session).await.unwrap();

    let state = session.state();
    assert_eq!(state.reminder_logs.len(), 2);
    assert!(commands::cmd_remind_logs(&session, 10).is_ok());

    let first = short_id(&state.reminder_logs[1].id).to_string();
    assert!(commands::cmd_remind_mailto(&session, Some(&first), Some("me@example.com")).is_ok());
    assert!(commands::cmd_remind_mailto(&session, Some("nope"), None).is_err());
}

#[tokio::test]
async fn test_cmd_remind_scan_while_another_scan_drafts() {
    let store = MemoryStore::new();
    let gate = Arc::new(tokio::sync::Notify::new());
    let mock = MockBackend::gated(gate.clone());
    let session = Arc::new(setup_session(&store, Some(mock.clone())));
    session.login().await;
    commands::cmd_add(&session, form("Hulu", 7.99, "2024-06-17")).await.unwrap();

    let background = tokio::spawn({
        let session = session.clone();
        async move { session.run_reminder_scan().await }
    });
    while mock.calls() == 0 {
        tokio::task::yield_now().await;
    }

    commands::cmd_remind_scan(&session).await.unwrap();
    gate.notify_one();
    background.await.unwrap().unwrap();

    assert_eq!(mock.calls(), 1);
    assert_eq!(session.state().reminder_logs.len(), 1);
}

#[tokio::test]
async fn test_cmd_remind_without_backend_fails() {
    let store = MemoryStore::new();
    let session = setup_session(&store, None);
    session.login().await;
    assert!(commands::cmd_remind_scan(&session).await.is_err());
}

// ========== Snapshot Command Tests ==========

#[tokio::test]
async fn test_cmd_export_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backup.json");

    let store = MemoryStore::new();
    let session = setup_session(&store, None);
    session.login().await;
    commands::cmd_add(&session, form("Netflix", 15.49, "2024-07-01")).await.unwrap();
    commands::cmd_export(&session, &path).unwrap();
    assert!(path.exists());

    let other = MemoryStore::new();
    let target = setup_session(&other, None);
    target.login().await;
    commands::cmd_import(&target, &path).await.unwrap();
    assert_eq!(target.state().subscriptions[0].name, "Netflix");
    assert_eq!(other.get("local").unwrap().subscriptions.len(), 1);

    assert!(commands::cmd_import(&target, &dir.path().join("missing.json")).await.is_err());
}

// ========== Status Command Tests ==========

#[tokio::test]
async fn test_cmd_status_reads_previous_save() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("subtrack.db");
    let args = commands::SessionArgs {
        db: &db_path,
        user: "local",
        config: None,
        no_encrypt: true,
    };

    assert!(commands::cmd_status(&args).await.is_ok());

    commands::cmd_init(&db_path, true).unwrap();
    let session = commands::open_session(&args).await.unwrap();
    commands::cmd_add(&session, form("Netflix", 15.49, "2030-01-01")).await.unwrap();
    drop(session);

    let db = commands::open_db(&db_path, true).unwrap();
    assert!(db.snapshot_updated_at("local").unwrap().is_some());
    assert!(commands::cmd_status(&args).await.is_ok());
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a much longer name", 10), "a much ...");
    assert_eq!(truncate("Crème brûlée club", 8), "Crème...");
}

#[test]
fn test_short_id() {
    assert_eq!(short_id("0123456789abcdef"), "01234567");
    assert_eq!(short_id("abc"), "abc");
}
