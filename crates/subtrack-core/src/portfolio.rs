//! Shared subscription state
//!
//! A [`Portfolio`] owns the subscription collection and reminder history for
//! one session. Readers take a [`PortfolioState`] snapshot (a cloned `Arc`)
//! and never see a half-applied update; writers build a new state and swap
//! it in whole.
//!
//! The session epoch guards writes that complete after an `await`: callers
//! capture [`Portfolio::epoch`] before suspending and hand it back when
//! committing. A mismatch means the session ended in between and the result
//! is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lifecycle;
use crate::models::{new_id, NewSubscription, ReminderLog, Subscription, SubscriptionStatus};
use crate::store::Snapshot;

/// Immutable view of the portfolio
#[derive(Debug, Clone, Default)]
pub struct PortfolioState {
    /// Newest first
    pub subscriptions: Vec<Arc<Subscription>>,
    /// Newest first
    pub reminder_logs: Vec<Arc<ReminderLog>>,
}

impl PortfolioState {
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Iterate subscriptions by reference
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter().map(|s| s.as_ref())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Subscription>> {
        self.subscriptions.iter().find(|s| s.id == id)
    }

    /// Look up by exact id, then by case-insensitive name
    pub fn find(&self, id_or_name: &str) -> Option<&Arc<Subscription>> {
        self.get(id_or_name).or_else(|| {
            let needle = id_or_name.trim().to_lowercase();
            self.subscriptions
                .iter()
                .find(|s| s.name.to_lowercase() == needle)
        })
    }

    /// Owned copy suitable for persisting
    pub fn to_snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        Snapshot::new(
            self.subscriptions.iter().map(|s| (**s).clone()).collect(),
            self.reminder_logs.iter().map(|l| (**l).clone()).collect(),
            now,
        )
    }
}

/// A single status change observed by a refresh pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub id: String,
    pub name: String,
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
}

/// Result of [`Portfolio::refresh_statuses`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub checked: usize,
    pub transitions: Vec<StatusTransition>,
}

impl RefreshReport {
    pub fn changed(&self) -> bool {
        !self.transitions.is_empty()
    }
}

/// Outcome of committing a late result against the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// The session epoch moved on while the result was in flight
    StaleEpoch,
    /// The subscription was deleted while the result was in flight
    Missing,
    /// The subscription no longer needs this reminder (already reminded in
    /// its current window, renewed, or expired meanwhile)
    NotDue,
}

struct Inner {
    state: RwLock<Arc<PortfolioState>>,
    epoch: AtomicU64,
}

/// Cloneable handle to the shared portfolio
#[derive(Clone)]
pub struct Portfolio {
    inner: Arc<Inner>,
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::new()
    }
}

impl Portfolio {
    pub fn new() -> Self {
        Self::from_state(PortfolioState::default())
    }

    pub fn from_state(state: PortfolioState) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(Arc::new(state)),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Current state; cheap, never blocks writers for long
    pub fn snapshot(&self) -> Arc<PortfolioState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Current session generation
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Start a new generation; in-flight results from the old one are dropped
    pub fn invalidate(&self) -> u64 {
        let next = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(epoch = next, "Portfolio epoch advanced");
        next
    }

    /// Apply `f` to the current state under the write lock
    ///
    /// `f` returns `None` to leave the state untouched.
    fn update<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&PortfolioState) -> (Option<PortfolioState>, T),
    {
        let mut guard = self.inner.state.write().unwrap_or_else(|e| e.into_inner());
        let (next, out) = f(&guard);
        if let Some(next) = next {
            *guard = Arc::new(next);
        }
        out
    }

    /// Replace everything with a loaded snapshot, re-deriving statuses at `now`
    pub fn load(&self, snapshot: Snapshot, now: DateTime<Utc>) {
        let subscriptions: Vec<Arc<Subscription>> = snapshot
            .subscriptions
            .into_iter()
            .map(|mut s| {
                s.status = s.derived_status(now);
                Arc::new(s)
            })
            .collect();
        let reminder_logs = snapshot.reminder_logs.into_iter().map(Arc::new).collect();

        info!(count = subscriptions.len(), "Loaded subscriptions");
        self.update(|_| {
            (
                Some(PortfolioState {
                    subscriptions,
                    reminder_logs,
                }),
                (),
            )
        });
    }

    /// Drop all subscriptions and logs
    pub fn clear(&self) {
        self.update(|_| (Some(PortfolioState::default()), ()));
    }

    /// Validate and insert a new subscription at the front
    pub fn add(&self, new: NewSubscription, now: DateTime<Utc>) -> Result<Arc<Subscription>> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("name must not be empty".into()));
        }
        if !new.price.is_finite() || new.price < 0.0 {
            return Err(Error::Validation(format!(
                "price must be a non-negative number, got {}",
                new.price
            )));
        }

        let currency = match new.currency.trim() {
            "" => "USD".to_string(),
            c => c.to_uppercase(),
        };
        let category = match new.category.trim() {
            "" => "Other".to_string(),
            c => c.to_string(),
        };

        let sub = Arc::new(Subscription {
            id: new_id(),
            name: name.to_string(),
            price: new.price,
            currency,
            billing_cycle: new.billing_cycle,
            start_date: Some(new.start_date),
            end_date: Some(new.end_date),
            category,
            status: lifecycle::derive_status(new.end_date, now),
            icon: new.icon,
            last_reminder_sent: None,
        });

        self.update(|state| {
            let mut next = state.clone();
            next.subscriptions.insert(0, sub.clone());
            (Some(next), ())
        });

        info!(id = %sub.id, name = %sub.name, status = %sub.status, "Added subscription");
        Ok(sub)
    }

    /// Hard delete; reminder logs are kept
    pub fn delete(&self, id: &str) -> Result<Arc<Subscription>> {
        let removed = self.update(|state| {
            let Some(pos) = state.subscriptions.iter().position(|s| s.id == id) else {
                return (None, None);
            };
            let mut next = state.clone();
            let removed = next.subscriptions.remove(pos);
            (Some(next), Some(removed))
        });

        match removed {
            Some(sub) => {
                info!(id = %sub.id, name = %sub.name, "Deleted subscription");
                Ok(sub)
            }
            None => Err(Error::NotFound(format!("subscription {}", id))),
        }
    }

    /// Advance the end date by one billing cycle
    ///
    /// An unknown end date restarts from `now`.
    pub fn renew(&self, id: &str, now: DateTime<Utc>) -> Result<Arc<Subscription>> {
        let renewed = self.update(|state| {
            let Some(pos) = state.subscriptions.iter().position(|s| s.id == id) else {
                return (None, None);
            };
            let current = &state.subscriptions[pos];
            let base = current.end_date.unwrap_or(now);
            let end = lifecycle::advance_by_cycle(base, current.billing_cycle);

            let mut updated = (**current).clone();
            updated.end_date = Some(end);
            updated.status = lifecycle::derive_status(end, now);
            let updated = Arc::new(updated);

            let mut next = state.clone();
            next.subscriptions[pos] = updated.clone();
            (Some(next), Some(updated))
        });

        match renewed {
            Some(sub) => {
                info!(
                    id = %sub.id,
                    name = %sub.name,
                    end_date = ?sub.end_date,
                    status = %sub.status,
                    "Renewed subscription"
                );
                Ok(sub)
            }
            None => Err(Error::NotFound(format!("subscription {}", id))),
        }
    }

    /// Re-derive every stored status at `now`
    ///
    /// Entries whose status is unchanged keep their `Arc`; when nothing
    /// changed the state is not swapped at all.
    pub fn refresh_statuses(&self, now: DateTime<Utc>) -> RefreshReport {
        self.update(|state| {
            let mut transitions = Vec::new();
            let subscriptions: Vec<Arc<Subscription>> = state
                .subscriptions
                .iter()
                .map(|sub| {
                    let derived = sub.derived_status(now);
                    if derived == sub.status {
                        return sub.clone();
                    }
                    transitions.push(StatusTransition {
                        id: sub.id.clone(),
                        name: sub.name.clone(),
                        from: sub.status,
                        to: derived,
                    });
                    let mut updated = (**sub).clone();
                    updated.status = derived;
                    Arc::new(updated)
                })
                .collect();

            let report = RefreshReport {
                checked: state.subscriptions.len(),
                transitions,
            };

            if !report.changed() {
                return (None, report);
            }

            let next = PortfolioState {
                subscriptions,
                reminder_logs: state.reminder_logs.clone(),
            };
            (Some(next), report)
        })
    }

    /// Record a dispatched reminder: append the log and stamp the subscription
    ///
    /// Both happen in one swap, or neither does.
    pub fn commit_reminder(&self, epoch: u64, log: ReminderLog, now: DateTime<Utc>) -> CommitOutcome {
        let Some(sub_id) = log.subscription_id.clone() else {
            return self.append_log(epoch, log);
        };

        self.update(|state| {
            if self.epoch() != epoch {
                return (None, CommitOutcome::StaleEpoch);
            }
            let Some(pos) = state.subscriptions.iter().position(|s| s.id == sub_id) else {
                return (None, CommitOutcome::Missing);
            };
            if lifecycle::reminder_state(&state.subscriptions[pos], now)
                != lifecycle::ReminderState::ExpiringUnreminded
            {
                return (None, CommitOutcome::NotDue);
            }

            let mut stamped = (*state.subscriptions[pos]).clone();
            stamped.last_reminder_sent = Some(now);

            let mut next = state.clone();
            next.subscriptions[pos] = Arc::new(stamped);
            next.reminder_logs.insert(0, Arc::new(log));
            (Some(next), CommitOutcome::Applied)
        })
    }

    /// Append a log entry without touching any subscription
    pub fn append_log(&self, epoch: u64, log: ReminderLog) -> CommitOutcome {
        self.update(|state| {
            if self.epoch() != epoch {
                return (None, CommitOutcome::StaleEpoch);
            }
            let mut next = state.clone();
            next.reminder_logs.insert(0, Arc::new(log));
            (Some(next), CommitOutcome::Applied)
        })
    }
}
