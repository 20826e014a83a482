//! Best-effort snapshot sync
//!
//! A [`Syncer`] pushes the current portfolio to the snapshot store. Failures
//! never propagate: they are logged and published on a watch channel so a
//! front end can show a "not saved" badge.
//!
//! Saves are serialized and each one snapshots the portfolio only once it
//! holds the save lock, so a slow save can never land after a newer one.
//! While held (after the stored copy could not be read) nothing is saved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::portfolio::Portfolio;
use crate::store::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    /// Nothing attempted yet
    Idle,
    Syncing,
    Synced { at: DateTime<Utc> },
    Failed { message: String, at: DateTime<Utc> },
}

impl SyncState {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncState::Failed { .. })
    }
}

/// Cloneable handle that saves the portfolio for one user
#[derive(Clone)]
pub struct Syncer {
    user_id: String,
    portfolio: Portfolio,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    state: Arc<watch::Sender<SyncState>>,
    save_lock: Arc<Mutex<()>>,
    held: Arc<AtomicBool>,
}

impl Syncer {
    pub fn new(
        user_id: &str,
        portfolio: Portfolio,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            user_id: user_id.to_string(),
            portfolio,
            store,
            clock,
            state: Arc::new(state),
            save_lock: Arc::new(Mutex::new(())),
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Record a failure that happened outside [`Syncer::sync`] (e.g. on fetch)
    pub fn mark_failed(&self, message: String) {
        self.state.send_replace(SyncState::Failed {
            message,
            at: self.clock.now(),
        });
    }

    fn mark_synced(&self) {
        self.state.send_replace(SyncState::Synced {
            at: self.clock.now(),
        });
    }

    /// Refuse to save until [`Syncer::release`]
    ///
    /// Used when the stored copy could not be read, so an empty or partial
    /// portfolio never overwrites it.
    pub fn hold(&self, message: String) {
        self.held.store(true, Ordering::SeqCst);
        self.mark_failed(message);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Save the current portfolio; returns whether the save succeeded
    pub async fn sync(&self) -> bool {
        let _guard = self.save_lock.lock().await;
        if self.is_held() {
            warn!(user = %self.user_id, "Not saving: stored snapshot was never loaded");
            self.mark_failed("stored snapshot could not be loaded; saving is paused".to_string());
            return false;
        }

        let epoch = self.portfolio.epoch();
        let snapshot = self.portfolio.snapshot().to_snapshot(self.clock.now());
        self.state.send_replace(SyncState::Syncing);

        match self.store.save(&self.user_id, &snapshot).await {
            Ok(()) => {
                debug!(
                    user = %self.user_id,
                    store = %self.store.describe(),
                    subscriptions = snapshot.subscriptions.len(),
                    "Snapshot synced"
                );
                self.mark_synced();
                true
            }
            Err(e) => {
                if self.portfolio.epoch() == epoch {
                    warn!(user = %self.user_id, error = %e, "Snapshot sync failed");
                }
                self.mark_failed(e.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::NewSubscription;
    use crate::store::{MemoryStore, Snapshot};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Holds the first save until `gate` is notified
    struct SlowFirstSave {
        inner: MemoryStore,
        gate: Arc<Notify>,
        first: AtomicBool,
        entered: Arc<Notify>,
    }

    #[async_trait]
    impl SnapshotStore for SlowFirstSave {
        async fn fetch(&self, user_id: &str) -> crate::error::Result<Option<Snapshot>> {
            self.inner.fetch(user_id).await
        }

        async fn save(&self, user_id: &str, snapshot: &Snapshot) -> crate::error::Result<()> {
            if !self.first.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                self.gate.notified().await;
            }
            self.inner.save(user_id, snapshot).await
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    #[tokio::test]
    async fn test_sync_success_and_failure_flags() {
        let store = MemoryStore::new();
        let syncer = Syncer::new(
            "local",
            Portfolio::new(),
            Arc::new(store.clone()),
            Arc::new(SystemClock),
        );
        let mut rx = syncer.subscribe();
        assert_eq!(syncer.state(), SyncState::Idle);

        assert!(syncer.sync().await);
        assert!(matches!(syncer.state(), SyncState::Synced { .. }));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();
        assert!(store.get("local").is_some());

        store.set_failing(true);
        assert!(!syncer.sync().await);
        assert!(syncer.state().is_failed());
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_slow_save_cannot_overwrite_newer_state() {
        let inner = MemoryStore::new();
        let gate = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        let portfolio = Portfolio::new();
        let syncer = Syncer::new(
            "local",
            portfolio.clone(),
            Arc::new(SlowFirstSave {
                inner: inner.clone(),
                gate: gate.clone(),
                first: AtomicBool::new(false),
                entered: entered.clone(),
            }),
            Arc::new(SystemClock),
        );

        let first = tokio::spawn({
            let syncer = syncer.clone();
            async move { syncer.sync().await }
        });
        entered.notified().await;

        let mut new = NewSubscription::with_defaults(chrono::Utc::now());
        new.name = "Netflix".into();
        portfolio.add(new, chrono::Utc::now()).unwrap();
        let second = tokio::spawn({
            let syncer = syncer.clone();
            async move { syncer.sync().await }
        });
        tokio::task::yield_now().await;

        gate.notify_one();
        assert!(first.await.unwrap());
        assert!(second.await.unwrap());
        assert_eq!(inner.get("local").unwrap().subscriptions.len(), 1);
    }

    #[tokio::test]
    async fn test_held_syncer_does_not_save() {
        let store = MemoryStore::new();
        let syncer = Syncer::new(
            "local",
            Portfolio::new(),
            Arc::new(store.clone()),
            Arc::new(SystemClock),
        );

        syncer.hold("fetch failed".into());
        assert!(!syncer.sync().await);
        assert!(syncer.state().is_failed());
        assert_eq!(store.save_count(), 0);

        syncer.release();
        assert!(syncer.sync().await);
        assert_eq!(store.save_count(), 1);
    }
}
