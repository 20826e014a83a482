//! Mock backend for tests and offline use
//!
//! Produces deterministic drafts from the subscription fields. The mode can
//! be flipped at runtime to simulate empty or failing responses, and an
//! optional gate holds every call until released.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::models::{BillingCycle, Impact, SavingsInsight, Subscription, SubscriptionDraft};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    #[default]
    Respond,
    /// Reply with blank text
    Empty,
    /// Fail every call
    Fail,
}

#[derive(Clone)]
pub struct MockBackend {
    pub healthy: bool,
    mode: Arc<RwLock<MockMode>>,
    calls: Arc<AtomicUsize>,
    gate: Option<Arc<Notify>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            healthy: true,
            mode: Arc::new(RwLock::new(MockMode::Respond)),
            calls: Arc::new(AtomicUsize::new(0)),
            gate: None,
        }
    }

    pub fn with_mode(mode: MockMode) -> Self {
        let backend = Self::new();
        backend.set_mode(mode);
        backend
    }

    /// Calls block until `gate` is notified, one permit per call
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn set_mode(&self, mode: MockMode) {
        *self.mode.write().unwrap_or_else(|e| e.into_inner()) = mode;
    }

    pub fn mode(&self) -> MockMode {
        *self.mode.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Draft calls made so far, across all clones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<MockMode> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.mode() {
            MockMode::Fail => Err(Error::Draft("mock backend failure".into())),
            mode => Ok(mode),
        }
    }
}

fn reminder_text(sub: &Subscription) -> String {
    let when = sub
        .end_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "soon".to_string());
    format!(
        "Subject: Your {name} subscription renews {when}\n\n\
         Hi,\n\nYour {name} plan ({price:.2} {currency}, {cycle}) renews on {when}. \
         Renew to avoid any interruption.\n\nThanks,\nSubTrack",
        name = sub.name,
        when = when,
        price = sub.price,
        currency = sub.currency,
        cycle = sub.billing_cycle,
    )
}

fn parse_text(input: &str) -> SubscriptionDraft {
    let lower = input.to_lowercase();

    let price = input
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter_map(|tok| tok.trim_matches('.').parse::<f64>().ok())
        .find(|p| *p > 0.0);

    let billing_cycle = [
        ("week", BillingCycle::Weekly),
        ("quarter", BillingCycle::Quarterly),
        ("year", BillingCycle::Yearly),
        ("annual", BillingCycle::Yearly),
        ("month", BillingCycle::Monthly),
    ]
    .iter()
    .find(|(needle, _)| lower.contains(needle))
    .map(|(_, cycle)| cycle.as_str().to_string());

    let currency = if input.contains('€') || lower.contains("eur") {
        Some("EUR".to_string())
    } else if input.contains('£') || lower.contains("gbp") {
        Some("GBP".to_string())
    } else if input.contains('$') || lower.contains("usd") {
        Some("USD".to_string())
    } else {
        None
    };

    let name: Vec<&str> = input
        .split_whitespace()
        .take_while(|w| !w.starts_with(|c: char| c.is_ascii_digit() || "$€£".contains(c)))
        .collect();
    let name = (!name.is_empty()).then(|| name.join(" "));

    SubscriptionDraft {
        name,
        price,
        billing_cycle,
        currency,
        category: None,
    }
}

#[async_trait]
impl super::DraftBackend for MockBackend {
    async fn draft_reminder_email(&self, subscription: &Subscription) -> Result<String> {
        match self.enter().await? {
            MockMode::Empty => Err(Error::Draft("backend returned an empty draft".into())),
            _ => Ok(reminder_text(subscription)),
        }
    }

    async fn draft_upcoming_dues_summary(&self, expiring: &[Arc<Subscription>]) -> Result<String> {
        if self.enter().await? == MockMode::Empty {
            return Err(Error::Draft("backend returned an empty draft".into()));
        }
        let lines: Vec<String> = expiring
            .iter()
            .map(|s| format!("- {}: {:.2} {}", s.name, s.price, s.currency))
            .collect();
        Ok(format!(
            "Subject: {} subscriptions renew soon\n\n{}",
            expiring.len(),
            lines.join("\n")
        ))
    }

    async fn parse_freeform_input(&self, input: &str) -> Result<SubscriptionDraft> {
        match self.enter().await? {
            MockMode::Empty => Ok(SubscriptionDraft::default()),
            _ => Ok(parse_text(input)),
        }
    }

    async fn savings_insights(&self, subscriptions: &[Arc<Subscription>]) -> Result<Vec<SavingsInsight>> {
        if self.enter().await? == MockMode::Empty {
            return Ok(Vec::new());
        }

        // Suggest annual billing for the priciest monthly plan
        let candidate = subscriptions
            .iter()
            .filter(|s| s.billing_cycle == BillingCycle::Monthly)
            .max_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));

        Ok(candidate
            .map(|s| SavingsInsight {
                title: format!("Switch {} to yearly billing", s.name),
                description: format!(
                    "Annual plans for services like {} are often around 15% cheaper.",
                    s.name
                ),
                impact: if s.price >= 20.0 { Impact::Medium } else { Impact::Low },
                potential_savings: s.price * 0.15,
            })
            .into_iter()
            .collect())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
