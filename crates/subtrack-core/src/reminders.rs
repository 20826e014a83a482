//! Reminder dispatch policy
//!
//! Each scan sends at most one automated reminder: the expiring, not yet
//! reminded subscription with the earliest end date. The draft call is the
//! only await point, so results are committed against the session epoch
//! captured before it. A result that arrives after logout, or for a
//! subscription deleted meanwhile, is dropped.
//!
//! Failed or empty drafts leave no log and no stamp; the subscription stays
//! eligible for the next scan.
//!
//! Scans never overlap: clones of a dispatcher share one in-flight flag, and
//! a scan started while another is drafting returns [`DispatchOutcome::Busy`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::ai::DraftBackend;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::lifecycle::{reminder_state, ReminderState};
use crate::models::{ReminderLog, Subscription, SubscriptionStatus};
use crate::portfolio::{CommitOutcome, Portfolio, PortfolioState};

/// Most recent draft failure, cleared by the next success
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftFailure {
    /// `None` for summary drafts
    pub subscription_id: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// What a single scan did
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Nothing expiring and unreminded
    Idle,
    /// Another scan is still drafting
    Busy,
    Sent {
        subscription_id: String,
        log_id: String,
    },
    Failed {
        subscription_id: String,
        error: String,
    },
    /// Session ended or subscription deleted while drafting
    Discarded { subscription_id: String },
}

/// What an on-demand summary did
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    /// No subscription is expiring; the backend was not called
    NothingDue,
    Drafted(ReminderLog),
    /// Session ended while drafting
    Discarded,
}

/// Expiring subscriptions that have not been reminded in their current window
pub fn eligible(state: &PortfolioState, now: DateTime<Utc>) -> Vec<Arc<Subscription>> {
    state
        .subscriptions
        .iter()
        .filter(|s| reminder_state(s, now) == ReminderState::ExpiringUnreminded)
        .cloned()
        .collect()
}

/// The subscription the next scan should remind about
///
/// Earliest end date first; collection order breaks ties.
pub fn next_due(state: &PortfolioState, now: DateTime<Utc>) -> Option<Arc<Subscription>> {
    eligible(state, now).into_iter().min_by_key(|s| s.end_date)
}

/// Every subscription whose derived status is expiring at `now`
pub fn expiring(state: &PortfolioState, now: DateTime<Utc>) -> Vec<Arc<Subscription>> {
    state
        .subscriptions
        .iter()
        .filter(|s| s.derived_status(now) == SubscriptionStatus::Expiring)
        .cloned()
        .collect()
}

/// Build a `mailto:` link from a drafted reminder
///
/// The subject is the first line without its `Subject: ` prefix; the body
/// is the full draft.
pub fn mailto_link(content: &str, recipient: Option<&str>) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    let subject = first_line.strip_prefix("Subject:").unwrap_or(first_line).trim();

    format!(
        "mailto:{}?subject={}&body={}",
        recipient.map(|r| urlencoding::encode(r).into_owned()).unwrap_or_default(),
        urlencoding::encode(subject),
        urlencoding::encode(content)
    )
}

/// Runs reminder scans and summaries against a shared portfolio
#[derive(Clone)]
pub struct ReminderDispatcher {
    portfolio: Portfolio,
    backend: Arc<dyn DraftBackend>,
    clock: Arc<dyn Clock>,
    failures: Arc<watch::Sender<Option<DraftFailure>>>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when a scan ends, including when it is cancelled
struct ScanGuard(Arc<AtomicBool>);

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReminderDispatcher {
    pub fn new(portfolio: Portfolio, backend: Arc<dyn DraftBackend>, clock: Arc<dyn Clock>) -> Self {
        let (failures, _) = watch::channel(None);
        Self {
            portfolio,
            backend,
            clock,
            failures: Arc::new(failures),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn last_failure(&self) -> Option<DraftFailure> {
        self.failures.borrow().clone()
    }

    fn record_failure(&self, subscription_id: Option<&str>, message: String) {
        self.failures.send_replace(Some(DraftFailure {
            subscription_id: subscription_id.map(str::to_string),
            message,
            at: self.clock.now(),
        }));
    }

    fn clear_failure(&self) {
        self.failures.send_if_modified(|f| f.take().is_some());
    }

    /// Remind about at most one subscription
    pub async fn scan_once(&self) -> DispatchOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Reminder scan already in progress");
            return DispatchOutcome::Busy;
        }
        let _guard = ScanGuard(self.in_flight.clone());

        let epoch = self.portfolio.epoch();
        let Some(sub) = next_due(&self.portfolio.snapshot(), self.clock.now()) else {
            return DispatchOutcome::Idle;
        };

        info!(id = %sub.id, name = %sub.name, "Drafting renewal reminder");

        let content = match self.backend.draft_reminder_email(&sub).await {
            Ok(content) if !content.trim().is_empty() => content,
            Ok(_) => return self.fail(&sub, "backend returned an empty draft".to_string()),
            Err(e) => return self.fail(&sub, e.to_string()),
        };

        let sent_at = self.clock.now();
        let log = ReminderLog::single(&sub.id, content, sent_at);
        let log_id = log.id.clone();

        match self.portfolio.commit_reminder(epoch, log, sent_at) {
            CommitOutcome::Applied => {
                self.clear_failure();
                info!(id = %sub.id, name = %sub.name, log_id = %log_id, "Reminder dispatched");
                DispatchOutcome::Sent {
                    subscription_id: sub.id.clone(),
                    log_id,
                }
            }
            outcome => {
                info!(id = %sub.id, ?outcome, "Discarding reminder draft");
                DispatchOutcome::Discarded {
                    subscription_id: sub.id.clone(),
                }
            }
        }
    }

    fn fail(&self, sub: &Subscription, error: String) -> DispatchOutcome {
        warn!(id = %sub.id, name = %sub.name, error = %error, "Reminder draft failed");
        self.record_failure(Some(&sub.id), error.clone());
        DispatchOutcome::Failed {
            subscription_id: sub.id.clone(),
            error,
        }
    }

    /// Draft one note covering everything currently expiring
    ///
    /// Never stamps `last_reminder_sent`.
    pub async fn draft_summary(&self) -> Result<SummaryOutcome> {
        let epoch = self.portfolio.epoch();
        let due = expiring(&self.portfolio.snapshot(), self.clock.now());
        if due.is_empty() {
            return Ok(SummaryOutcome::NothingDue);
        }

        info!(count = due.len(), "Drafting upcoming dues summary");

        let content = match self.backend.draft_upcoming_dues_summary(&due).await {
            Ok(content) if !content.trim().is_empty() => content,
            Ok(_) => {
                let message = "backend returned an empty draft".to_string();
                self.record_failure(None, message.clone());
                return Err(Error::Draft(message));
            }
            Err(e) => {
                warn!(error = %e, "Summary draft failed");
                self.record_failure(None, e.to_string());
                return Err(e);
            }
        };

        let log = ReminderLog::summary(content, self.clock.now());
        match self.portfolio.append_log(epoch, log.clone()) {
            CommitOutcome::Applied => {
                self.clear_failure();
                Ok(SummaryOutcome::Drafted(log))
            }
            _ => {
                info!("Discarding summary draft from an ended session");
                Ok(SummaryOutcome::Discarded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockBackend, MockMode};
    use crate::clock::ManualClock;
    use crate::models::{NewSubscription, ReminderType};
    use chrono::{Duration, TimeZone};
    use tokio::sync::Notify;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn add(portfolio: &Portfolio, name: &str, end_in: Duration) -> Arc<Subscription> {
        let mut new = NewSubscription::with_defaults(start());
        new.name = name.to_string();
        new.price = 10.0;
        new.end_date = start() + end_in;
        portfolio.add(new, start()).unwrap()
    }

    fn dispatcher(portfolio: &Portfolio, mock: &MockBackend) -> ReminderDispatcher {
        ReminderDispatcher::new(
            portfolio.clone(),
            Arc::new(mock.clone()),
            Arc::new(ManualClock::new(start())),
        )
    }

    #[tokio::test]
    async fn test_one_reminder_per_scan() {
        let portfolio = Portfolio::new();
        add(&portfolio, "A", Duration::days(2));
        add(&portfolio, "B", Duration::days(1));
        add(&portfolio, "C", Duration::hours(30));
        add(&portfolio, "Later", Duration::days(20));

        let mock = MockBackend::new();
        let dispatcher = dispatcher(&portfolio, &mock);

        for expected_logs in 1..=3 {
            assert!(matches!(dispatcher.scan_once().await, DispatchOutcome::Sent { .. }));
            assert_eq!(portfolio.snapshot().reminder_logs.len(), expected_logs);
        }
        assert_eq!(dispatcher.scan_once().await, DispatchOutcome::Idle);
        assert_eq!(mock.calls(), 3);

        let state = portfolio.snapshot();
        let stamped = state
            .subscriptions
            .iter()
            .filter(|s| s.last_reminder_sent.is_some())
            .count();
        assert_eq!(stamped, 3);
        assert!(state.find("Later").unwrap().last_reminder_sent.is_none());
        assert!(state
            .reminder_logs
            .iter()
            .all(|l| l.reminder_type == ReminderType::Single));
    }

    #[tokio::test]
    async fn test_earliest_end_date_goes_first() {
        let portfolio = Portfolio::new();
        add(&portfolio, "Two days", Duration::days(2));
        let soonest = add(&portfolio, "One day", Duration::days(1));
        add(&portfolio, "Three days", Duration::days(3));

        let mock = MockBackend::new();
        match dispatcher(&portfolio, &mock).scan_once().await {
            DispatchOutcome::Sent { subscription_id, .. } => assert_eq!(subscription_id, soonest.id),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_draft_leaves_subscription_eligible() {
        let portfolio = Portfolio::new();
        let sub = add(&portfolio, "Netflix", Duration::days(2));
        let mock = MockBackend::with_mode(MockMode::Fail);
        let dispatcher = dispatcher(&portfolio, &mock);

        assert!(matches!(dispatcher.scan_once().await, DispatchOutcome::Failed { .. }));
        let state = portfolio.snapshot();
        assert!(state.reminder_logs.is_empty());
        assert!(state.subscriptions[0].last_reminder_sent.is_none());
        assert_eq!(
            dispatcher.last_failure().and_then(|f| f.subscription_id),
            Some(sub.id.clone())
        );

        mock.set_mode(MockMode::Empty);
        assert!(matches!(dispatcher.scan_once().await, DispatchOutcome::Failed { .. }));
        assert!(portfolio.snapshot().reminder_logs.is_empty());

        mock.set_mode(MockMode::Respond);
        assert!(matches!(dispatcher.scan_once().await, DispatchOutcome::Sent { .. }));
        assert!(dispatcher.last_failure().is_none());
    }

    #[tokio::test]
    async fn test_logout_during_draft_discards_result() {
        let portfolio = Portfolio::new();
        add(&portfolio, "Netflix", Duration::days(2));

        let gate = Arc::new(Notify::new());
        let mock = MockBackend::gated(gate.clone());
        let dispatcher = dispatcher(&portfolio, &mock);

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.scan_once().await }
        });

        while mock.calls() == 0 {
            tokio::task::yield_now().await;
        }
        portfolio.invalidate();
        gate.notify_one();

        assert!(matches!(task.await.unwrap(), DispatchOutcome::Discarded { .. }));
        let state = portfolio.snapshot();
        assert!(state.reminder_logs.is_empty());
        assert!(state.subscriptions[0].last_reminder_sent.is_none());
    }

    #[tokio::test]
    async fn test_overlapping_scans_draft_once() {
        let portfolio = Portfolio::new();
        add(&portfolio, "Netflix", Duration::days(2));

        let gate = Arc::new(Notify::new());
        let mock = MockBackend::gated(gate.clone());
        let dispatcher = dispatcher(&portfolio, &mock);

        let first = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.scan_once().await }
        });
        while mock.calls() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(dispatcher.clone().scan_once().await, DispatchOutcome::Busy);
        gate.notify_one();
        assert!(matches!(first.await.unwrap(), DispatchOutcome::Sent { .. }));

        assert_eq!(mock.calls(), 1);
        assert_eq!(portfolio.snapshot().reminder_logs.len(), 1);
        assert_eq!(dispatcher.scan_once().await, DispatchOutcome::Idle);
    }

    #[tokio::test]
    async fn test_delete_during_draft_discards_result() {
        let portfolio = Portfolio::new();
        let sub = add(&portfolio, "Netflix", Duration::days(2));

        let gate = Arc::new(Notify::new());
        let mock = MockBackend::gated(gate.clone());
        let dispatcher = dispatcher(&portfolio, &mock);

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.scan_once().await }
        });
        while mock.calls() == 0 {
            tokio::task::yield_now().await;
        }
        portfolio.delete(&sub.id).unwrap();
        gate.notify_one();

        assert!(matches!(task.await.unwrap(), DispatchOutcome::Discarded { .. }));
        assert!(portfolio.snapshot().reminder_logs.is_empty());
    }

    #[tokio::test]
    async fn test_summary_covers_expiring_without_stamping() {
        let portfolio = Portfolio::new();
        add(&portfolio, "A", Duration::days(1));
        add(&portfolio, "B", Duration::days(2));
        add(&portfolio, "Later", Duration::days(10));

        let mock = MockBackend::new();
        let dispatcher = dispatcher(&portfolio, &mock);

        let log = match dispatcher.draft_summary().await.unwrap() {
            SummaryOutcome::Drafted(log) => log,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(log.reminder_type, ReminderType::Summary);
        assert!(log.subscription_id.is_none());
        assert!(log.content.starts_with("Subject: 2 subscriptions"));

        let state = portfolio.snapshot();
        assert_eq!(state.reminder_logs.len(), 1);
        assert!(state.subscriptions.iter().all(|s| s.last_reminder_sent.is_none()));
    }

    #[tokio::test]
    async fn test_summary_with_nothing_expiring_skips_backend() {
        let portfolio = Portfolio::new();
        add(&portfolio, "Later", Duration::days(10));
        let mock = MockBackend::new();

        let outcome = dispatcher(&portfolio, &mock).draft_summary().await.unwrap();
        assert_eq!(outcome, SummaryOutcome::NothingDue);
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn test_mailto_link() {
        let link = mailto_link("Subject: Renew Netflix now\n\nHi there & thanks", None);
        assert!(link.starts_with("mailto:?subject=Renew%20Netflix%20now&body="));
        assert!(link.contains("Hi%20there%20%26%20thanks"));

        let link = mailto_link("No subject line", Some("me@example.com"));
        assert!(link.starts_with("mailto:me%40example.com?subject=No%20subject%20line"));
    }

    #[test]
    fn test_stale_reminder_makes_subscription_eligible_again() {
        let portfolio = Portfolio::new();
        add(&portfolio, "Netflix", Duration::days(2));
        let mut snapshot = portfolio.snapshot().to_snapshot(start());
        snapshot.subscriptions[0].last_reminder_sent = Some(start() - Duration::days(30));
        portfolio.load(snapshot, start());

        let due = eligible(&portfolio.snapshot(), start());
        assert_eq!(due.len(), 1);
    }
}
