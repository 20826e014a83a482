//! Subscription lifecycle rules
//!
//! Pure functions shared by the refresh scheduler, the aggregation engine
//! and the reminder policy:
//! - cost normalization to a monthly basis
//! - status derivation from the end date
//! - reminder eligibility within the expiring window
//! - renewal date arithmetic and countdowns

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::models::{BillingCycle, Subscription, SubscriptionStatus};

/// Average number of weeks in a month, used for weekly normalization
pub const WEEKS_PER_MONTH: f64 = 4.33;

/// Length of the expiring window before the end date, in days
pub const EXPIRING_WINDOW_DAYS: i64 = 3;

/// The expiring window as a duration
pub fn expiring_window() -> Duration {
    Duration::days(EXPIRING_WINDOW_DAYS)
}

/// Convert a price charged every `cycle` into its monthly equivalent
pub fn monthly_cost(price: f64, cycle: BillingCycle) -> f64 {
    match cycle {
        BillingCycle::Weekly => price * WEEKS_PER_MONTH,
        BillingCycle::Monthly => price,
        BillingCycle::Quarterly => price / 3.0,
        BillingCycle::Yearly => price / 12.0,
    }
}

/// Derive the lifecycle status of a subscription ending at `end_date`
///
/// Exactly at the end date is expired; exactly three days before is expiring.
pub fn derive_status(end_date: DateTime<Utc>, now: DateTime<Utc>) -> SubscriptionStatus {
    let diff = end_date - now;

    if diff <= Duration::zero() {
        SubscriptionStatus::Expired
    } else if diff <= expiring_window() {
        SubscriptionStatus::Expiring
    } else {
        SubscriptionStatus::Active
    }
}

/// Like [`derive_status`], but an unknown end date reads as expired
pub fn derive_status_lenient(
    end_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SubscriptionStatus {
    match end_date {
        Some(end) => derive_status(end, now),
        None => SubscriptionStatus::Expired,
    }
}

/// Parse a stored timestamp
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or a bare
/// `YYYY-MM-DD` (UTC midnight). Returns `None` for anything else.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Move a renewal date forward by one billing cycle
///
/// Month arithmetic clamps to the end of shorter months (Jan 31 → Feb 29).
pub fn advance_by_cycle(date: DateTime<Utc>, cycle: BillingCycle) -> DateTime<Utc> {
    let months = match cycle {
        BillingCycle::Weekly => return date + Duration::weeks(1),
        BillingCycle::Monthly => 1,
        BillingCycle::Quarterly => 3,
        BillingCycle::Yearly => 12,
    };

    date.checked_add_months(Months::new(months))
        .unwrap_or(date + Duration::days(30 * months as i64))
}

/// Time left until an end date, split into display units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl std::fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}d {:02}h {:02}m {:02}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Countdown to `end_date`, or `None` once it has passed
pub fn time_remaining(end_date: DateTime<Utc>, now: DateTime<Utc>) -> Option<TimeRemaining> {
    let diff = end_date - now;
    if diff <= Duration::zero() {
        return None;
    }

    let total_seconds = diff.num_seconds();
    Some(TimeRemaining {
        days: total_seconds / 86_400,
        hours: (total_seconds / 3_600) % 24,
        minutes: (total_seconds / 60) % 60,
        seconds: total_seconds % 60,
    })
}

/// Where a subscription stands with respect to automated reminders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    /// Not expiring, nothing to send
    NoReminderNeeded,
    /// Expiring and not yet reminded in the current window
    ExpiringUnreminded,
    /// Expiring and already reminded in the current window
    ExpiringReminded,
}

/// Classify a subscription for the reminder scan
///
/// A `last_reminder_sent` older than the start of the current expiring
/// window (end date minus three days) belongs to an earlier billing period
/// and no longer counts, so renewed subscriptions get reminded again.
pub fn reminder_state(sub: &Subscription, now: DateTime<Utc>) -> ReminderState {
    let end = match sub.end_date {
        Some(end) if derive_status(end, now) == SubscriptionStatus::Expiring => end,
        _ => return ReminderState::NoReminderNeeded,
    };

    let window_start = end - expiring_window();
    match sub.last_reminder_sent {
        Some(sent) if sent >= window_start => ReminderState::ExpiringReminded,
        _ => ReminderState::ExpiringUnreminded,
    }
}
