//! Periodic background tasks
//!
//! Two loops run per session:
//! - status refresh (default every 10s): re-derives every status and logs
//!   transitions
//! - reminder scan (default every 60s): dispatches at most one reminder
//!
//! Each loop is a single tokio task. Ticks run sequentially and late ticks
//! are delayed rather than bunched, so passes never overlap. The first tick
//! fires one period after start.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::portfolio::Portfolio;
use crate::reminders::{DispatchOutcome, ReminderDispatcher};
use crate::sync::Syncer;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running periodic loop
///
/// Dropping the handle cancels the loop.
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Run `tick` every `period` until cancelled
    ///
    /// Cancellation also interrupts a tick that is in progress. A zero
    /// period is raised to one millisecond.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            debug!(task = name, period_secs = period.as_secs_f64(), "Periodic task started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = tick() => {}
                            _ = token.cancelled() => break,
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
            debug!(task = name, "Periodic task stopped");
        });

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop without waiting
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the loop and wait for it to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Keep stored statuses current
///
/// With a `syncer`, a pass that changed anything is persisted.
pub fn spawn_status_refresh(
    portfolio: Portfolio,
    clock: Arc<dyn Clock>,
    period: Duration,
    syncer: Option<Syncer>,
) -> PeriodicTask {
    PeriodicTask::spawn("status_refresh", period, move || {
        let portfolio = portfolio.clone();
        let clock = clock.clone();
        let syncer = syncer.clone();
        async move {
            let report = portfolio.refresh_statuses(clock.now());
            for t in &report.transitions {
                info!(id = %t.id, name = %t.name, from = %t.from, to = %t.to, "Status changed");
            }
            if report.changed() {
                if let Some(syncer) = syncer {
                    syncer.sync().await;
                }
            }
        }
    })
}

/// Dispatch due reminders, one per tick
///
/// A successful dispatch is persisted so the stamp survives restarts.
pub fn spawn_reminder_scan(
    dispatcher: ReminderDispatcher,
    period: Duration,
    syncer: Option<Syncer>,
) -> PeriodicTask {
    PeriodicTask::spawn("reminder_scan", period, move || {
        let dispatcher = dispatcher.clone();
        let syncer = syncer.clone();
        async move {
            if let DispatchOutcome::Sent { .. } = dispatcher.scan_once().await {
                if let Some(syncer) = syncer {
                    syncer.sync().await;
                }
            }
        }
    })
}
