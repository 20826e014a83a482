//! Domain models for SubTrack
//!
//! Field names serialize in camelCase so snapshots stay readable by the
//! dashboard front end that shares the same storage file.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::{self, TimeRemaining};

/// Subscription billing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }

    pub fn all() -> &'static [BillingCycle] {
        &[Self::Weekly, Self::Monthly, Self::Quarterly, Self::Yearly]
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" | "week" => Ok(Self::Weekly),
            "monthly" | "month" => Ok(Self::Monthly),
            "quarterly" | "quarter" => Ok(Self::Quarterly),
            "yearly" | "year" | "annual" | "annually" => Ok(Self::Yearly),
            _ => Err(format!("Unknown billing cycle: {}", s)),
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status, derived from the end date and the current time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    /// Within three days of the end date
    Expiring,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expiring => "expiring",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tracked recurring charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub billing_cycle: BillingCycle,
    /// `None` when the stored value could not be parsed
    #[serde(default, with = "lenient_timestamp")]
    pub start_date: Option<DateTime<Utc>>,
    /// Next (or final) renewal instant. `None` when the stored value could not
    /// be parsed; such subscriptions are treated as expired.
    #[serde(default, with = "lenient_timestamp")]
    pub end_date: Option<DateTime<Utc>>,
    pub category: String,
    /// Stored copy of the derived status. Only the refresh pass writes it.
    pub status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminder_sent: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Price normalized to a monthly basis
    pub fn monthly_cost(&self) -> f64 {
        lifecycle::monthly_cost(self.price, self.billing_cycle)
    }

    /// Status as of `now`, regardless of what is stored
    pub fn derived_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        lifecycle::derive_status_lenient(self.end_date, now)
    }

    /// Countdown to the end date, `None` once expired
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<TimeRemaining> {
        self.end_date
            .and_then(|end| lifecycle::time_remaining(end, now))
    }
}

/// User input for a new subscription (id and status are assigned on insert)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub billing_cycle: BillingCycle,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub category: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl NewSubscription {
    /// Blank form values: USD, monthly, "Entertainment", renewing in a month
    pub fn with_defaults(now: DateTime<Utc>) -> Self {
        let end_date = now
            .checked_add_months(Months::new(1))
            .unwrap_or(now + chrono::Duration::days(30));

        Self {
            name: String::new(),
            price: 0.0,
            currency: "USD".to_string(),
            billing_cycle: BillingCycle::Monthly,
            start_date: now,
            end_date,
            category: "Entertainment".to_string(),
            icon: None,
        }
    }
}

/// Partial subscription fields extracted from free-form text by the AI backend
///
/// Every field is optional; the backend leaves out what it cannot find.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, alias = "billing_cycle")]
    pub billing_cycle: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl SubscriptionDraft {
    /// True when the backend extracted nothing usable
    pub fn is_empty(&self) -> bool {
        non_blank(&self.name).is_none()
            && self.price.map_or(true, |p| !(p > 0.0))
            && self.cycle().is_none()
            && non_blank(&self.currency).is_none()
            && non_blank(&self.category).is_none()
    }

    /// The billing cycle, if the backend returned one we recognize
    pub fn cycle(&self) -> Option<BillingCycle> {
        self.billing_cycle.as_deref().and_then(|c| c.parse().ok())
    }

    /// Overlay the extracted fields on top of `form`
    ///
    /// Blank strings, non-positive prices and unknown cycles keep the form value.
    pub fn apply_to(&self, mut form: NewSubscription) -> NewSubscription {
        if let Some(name) = non_blank(&self.name) {
            form.name = name.to_string();
        }
        if let Some(price) = self.price.filter(|p| p.is_finite() && *p > 0.0) {
            form.price = price;
        }
        if let Some(cycle) = self.cycle() {
            form.billing_cycle = cycle;
        }
        if let Some(currency) = non_blank(&self.currency) {
            form.currency = currency.to_uppercase();
        }
        if let Some(category) = non_blank(&self.category) {
            form.category = category.to_string();
        }
        form
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Kind of reminder draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderType {
    /// One subscription, produced by the automatic scan
    Single,
    /// Portfolio-wide summary of upcoming dues
    Summary,
}

impl ReminderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Summary => "summary",
        }
    }
}

/// Processing state of a reminder draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderLogStatus {
    Draft,
    Processed,
}

impl ReminderLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Processed => "processed",
        }
    }
}

/// Immutable record of a generated reminder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderLog {
    pub id: String,
    /// Absent for portfolio-wide summaries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(rename = "type")]
    pub reminder_type: ReminderType,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    pub status: ReminderLogStatus,
}

impl ReminderLog {
    /// Log entry for an automatically dispatched single-subscription reminder
    pub fn single(subscription_id: &str, content: String, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            subscription_id: Some(subscription_id.to_string()),
            reminder_type: ReminderType::Single,
            content,
            sent_at,
            recipient_email: None,
            status: ReminderLogStatus::Processed,
        }
    }

    /// Log entry for an on-demand summary draft
    pub fn summary(content: String, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            subscription_id: None,
            reminder_type: ReminderType::Summary,
            content,
            sent_at,
            recipient_email: None,
            status: ReminderLogStatus::Draft,
        }
    }
}

/// Impact level of a savings insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A cost-cutting suggestion produced by the AI backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsInsight {
    pub title: String,
    pub description: String,
    pub impact: Impact,
    /// Estimated monthly savings in the portfolio currency
    #[serde(default, alias = "potential_savings")]
    pub potential_savings: f64,
}

/// Generate a new opaque identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Serde adapter for timestamps that may be missing or malformed in stored data
mod lenient_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(serde_json::Value::String(s)) => crate::lifecycle::parse_timestamp(&s),
            _ => None,
        })
    }
}
