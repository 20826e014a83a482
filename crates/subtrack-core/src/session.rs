//! One user's working session
//!
//! A [`Session`] owns the shared portfolio for a user id and wires it to the
//! snapshot store, the optional draft backend and the background loops.
//! Every mutating operation is followed by a best-effort sync; sync failures
//! show up in [`Session::sync_state`] and never fail the operation itself.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::ai::DraftBackend;
use crate::analytics::{self, PortfolioAnalytics, RandomBand, TrendProjection};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{NewSubscription, SavingsInsight, Subscription};
use crate::portfolio::{Portfolio, PortfolioState, RefreshReport};
use crate::reminders::{DispatchOutcome, ReminderDispatcher, SummaryOutcome};
use crate::scheduler::{self, PeriodicTask};
use crate::store::{Snapshot, SnapshotStore};
use crate::sync::{SyncState, Syncer};

/// Result of [`Session::login`]
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// A stored snapshot was loaded
    Loaded { subscriptions: usize },
    /// Nothing stored yet for this user
    Fresh,
    /// The store could not be read; the session starts empty and nothing is saved
    FetchFailed(String),
}

pub struct Session {
    user_id: String,
    portfolio: Portfolio,
    syncer: Syncer,
    clock: Arc<dyn Clock>,
    backend: Option<Arc<dyn DraftBackend>>,
    dispatcher: Option<ReminderDispatcher>,
    config: AppConfig,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl Session {
    pub fn new(
        user_id: &str,
        store: Arc<dyn SnapshotStore>,
        backend: Option<Arc<dyn DraftBackend>>,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    ) -> Self {
        let portfolio = Portfolio::new();
        let syncer = Syncer::new(user_id, portfolio.clone(), store, clock.clone());
        let dispatcher = backend
            .clone()
            .map(|b| ReminderDispatcher::new(portfolio.clone(), b, clock.clone()));

        Self {
            user_id: user_id.to_string(),
            portfolio,
            syncer,
            clock,
            backend,
            dispatcher,
            config,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Current subscriptions and logs
    pub fn state(&self) -> Arc<PortfolioState> {
        self.portfolio.snapshot()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn dispatcher(&self) -> Option<&ReminderDispatcher> {
        self.dispatcher.as_ref()
    }

    pub fn sync_state(&self) -> SyncState {
        self.syncer.state()
    }

    pub fn subscribe_sync(&self) -> tokio::sync::watch::Receiver<SyncState> {
        self.syncer.subscribe()
    }

    pub fn describe_store(&self) -> String {
        self.syncer.store().describe()
    }

    /// Load the user's snapshot and write it back with fresh statuses
    pub async fn login(&self) -> LoginOutcome {
        self.portfolio.invalidate();
        self.portfolio.clear();

        let fetched = self.syncer.store().fetch(&self.user_id).await;
        let outcome = match fetched {
            Ok(Some(snapshot)) => {
                let count = snapshot.subscriptions.len();
                self.portfolio.load(snapshot, self.clock.now());
                LoginOutcome::Loaded {
                    subscriptions: count,
                }
            }
            Ok(None) => LoginOutcome::Fresh,
            Err(e) => {
                warn!(user = %self.user_id, error = %e, "Snapshot fetch failed");
                self.syncer.hold(e.to_string());
                return LoginOutcome::FetchFailed(e.to_string());
            }
        };

        info!(user = %self.user_id, ?outcome, "Session started");
        self.syncer.release();
        self.syncer.sync().await;
        outcome
    }

    /// Save now; returns whether the save succeeded
    pub async fn sync(&self) -> bool {
        self.syncer.sync().await
    }

    pub async fn add(&self, new: NewSubscription) -> Result<Arc<Subscription>> {
        let sub = self.portfolio.add(new, self.clock.now())?;
        self.syncer.sync().await;
        Ok(sub)
    }

    /// Delete by id or name
    pub async fn delete(&self, id_or_name: &str) -> Result<Arc<Subscription>> {
        let id = self.resolve(id_or_name)?;
        let sub = self.portfolio.delete(&id)?;
        self.syncer.sync().await;
        Ok(sub)
    }

    /// Renew by id or name
    pub async fn renew(&self, id_or_name: &str) -> Result<Arc<Subscription>> {
        let id = self.resolve(id_or_name)?;
        let sub = self.portfolio.renew(&id, self.clock.now())?;
        self.syncer.sync().await;
        Ok(sub)
    }

    fn resolve(&self, id_or_name: &str) -> Result<String> {
        self.portfolio
            .snapshot()
            .find(id_or_name)
            .map(|s| s.id.clone())
            .ok_or_else(|| Error::NotFound(format!("subscription {}", id_or_name)))
    }

    /// Current portfolio as a storable snapshot
    pub fn export_snapshot(&self) -> Snapshot {
        self.portfolio.snapshot().to_snapshot(self.clock.now())
    }

    /// Replace the portfolio with `snapshot` and save it
    ///
    /// Drafts in flight against the old contents are discarded. An import
    /// also resumes saving after a failed login fetch.
    pub async fn import_snapshot(&self, snapshot: Snapshot) -> Result<usize> {
        snapshot.check_version()?;
        let count = snapshot.subscriptions.len();
        self.portfolio.invalidate();
        self.portfolio.load(snapshot, self.clock.now());
        self.syncer.release();
        self.syncer.sync().await;
        Ok(count)
    }

    /// One status refresh pass outside the background loop
    pub async fn refresh_statuses(&self) -> RefreshReport {
        let report = self.portfolio.refresh_statuses(self.clock.now());
        if report.changed() && self.config.sync_on_status_change {
            self.syncer.sync().await;
        }
        report
    }

    /// Dashboard figures using the configured trend band
    pub fn analytics(&self) -> PortfolioAnalytics {
        let projection = RandomBand::new(self.config.trend_low, self.config.trend_high);
        self.analytics_with(&projection)
    }

    pub fn analytics_with(&self, projection: &dyn TrendProjection) -> PortfolioAnalytics {
        let state = self.portfolio.snapshot();
        analytics::summarize(state.iter(), self.clock.now(), projection)
    }

    fn require_backend(&self) -> Result<&Arc<dyn DraftBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| Error::Draft("no draft backend configured".into()))
    }

    fn require_dispatcher(&self) -> Result<&ReminderDispatcher> {
        self.dispatcher
            .as_ref()
            .ok_or_else(|| Error::Draft("no draft backend configured".into()))
    }

    /// Run one reminder scan now
    pub async fn run_reminder_scan(&self) -> Result<DispatchOutcome> {
        let outcome = self.require_dispatcher()?.scan_once().await;
        if let DispatchOutcome::Sent { .. } = outcome {
            self.syncer.sync().await;
        }
        Ok(outcome)
    }

    /// Draft a summary of everything currently expiring
    pub async fn draft_summary(&self) -> Result<SummaryOutcome> {
        let outcome = self.require_dispatcher()?.draft_summary().await?;
        if let SummaryOutcome::Drafted(_) = outcome {
            self.syncer.sync().await;
        }
        Ok(outcome)
    }

    /// Prefill a new subscription from free text
    ///
    /// Fields the backend could not extract keep their form defaults.
    pub async fn parse_freeform(&self, text: &str) -> Result<NewSubscription> {
        let draft = self.require_backend()?.parse_freeform_input(text).await?;
        if draft.is_empty() {
            warn!("Nothing could be extracted from the description");
        }
        Ok(draft.apply_to(NewSubscription::with_defaults(self.clock.now())))
    }

    pub async fn savings_insights(&self) -> Result<Vec<SavingsInsight>> {
        let state = self.portfolio.snapshot();
        if state.is_empty() {
            return Ok(Vec::new());
        }
        self.require_backend()?
            .savings_insights(&state.subscriptions)
            .await
    }

    /// Start the refresh loop, and the reminder scan when a backend is set
    ///
    /// Does nothing when the loops are already running.
    pub fn start_background(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if tasks.iter().any(PeriodicTask::is_running) {
            return;
        }
        tasks.clear();

        let refresh_syncer = self
            .config
            .sync_on_status_change
            .then(|| self.syncer.clone());
        tasks.push(scheduler::spawn_status_refresh(
            self.portfolio.clone(),
            self.clock.clone(),
            self.config.refresh_interval,
            refresh_syncer,
        ));

        match &self.dispatcher {
            Some(dispatcher) => tasks.push(scheduler::spawn_reminder_scan(
                dispatcher.clone(),
                self.config.reminder_scan_interval,
                Some(self.syncer.clone()),
            )),
            None => info!("No draft backend; automatic reminders are off"),
        }

        info!(
            user = %self.user_id,
            refresh_secs = self.config.refresh_interval.as_secs(),
            reminder_scan_secs = self.config.reminder_scan_interval.as_secs(),
            "Background tasks started"
        );
    }

    pub fn background_running(&self) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(PeriodicTask::is_running)
    }

    pub async fn stop_background(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            task.stop().await;
        }
    }

    /// End the session: stop the loops, drop in-flight drafts, clear local state
    ///
    /// The stored snapshot is left as last synced.
    pub async fn logout(&self) {
        self.stop_background().await;
        self.portfolio.invalidate();
        self.portfolio.clear();
        info!(user = %self.user_id, "Session ended");
    }
}
