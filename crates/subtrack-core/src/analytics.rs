//! Portfolio aggregation
//!
//! Turns the current subscription collection into the figures shown on the
//! dashboard and analytics views: normalized totals, the category mix,
//! status counts and a twelve-month trend.
//!
//! The trend is illustrative. No spending history is retained, so each
//! month is the current monthly total scaled by a [`TrendProjection`]
//! multiplier. [`PortfolioAnalytics::trend_is_synthetic`] says so to callers.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::models::{Subscription, SubscriptionStatus};

/// Calendar month labels for the trend series
pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Default lower bound of the trend multiplier band
pub const DEFAULT_TREND_LOW: f64 = 0.85;
/// Default upper bound of the trend multiplier band
pub const DEFAULT_TREND_HIGH: f64 = 1.15;

/// Strategy for projecting a monthly amount across the trend series
pub trait TrendProjection: Send + Sync {
    /// Multiplier applied to the monthly total for month `index` (0 = Jan)
    fn multiplier(&self, index: usize) -> f64;

    /// Whether the projected values are made up rather than measured
    fn is_synthetic(&self) -> bool {
        true
    }
}

/// Uniform random multipliers in a bounded band
///
/// Seed it for repeatable output.
pub struct RandomBand {
    low: f64,
    high: f64,
    rng: Mutex<StdRng>,
}

impl RandomBand {
    pub fn new(low: f64, high: f64) -> Self {
        Self::with_rng(low, high, StdRng::from_entropy())
    }

    pub fn seeded(low: f64, high: f64, seed: u64) -> Self {
        Self::with_rng(low, high, StdRng::seed_from_u64(seed))
    }

    fn with_rng(low: f64, high: f64, rng: StdRng) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self {
            low,
            high,
            rng: Mutex::new(rng),
        }
    }
}

impl Default for RandomBand {
    fn default() -> Self {
        Self::new(DEFAULT_TREND_LOW, DEFAULT_TREND_HIGH)
    }
}

impl TrendProjection for RandomBand {
    fn multiplier(&self, _index: usize) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(self.low..=self.high)
    }
}

/// The same multiplier every month
#[derive(Debug, Clone, Copy)]
pub struct FlatProjection(pub f64);

impl Default for FlatProjection {
    fn default() -> Self {
        Self(1.0)
    }
}

impl TrendProjection for FlatProjection {
    fn multiplier(&self, _index: usize) -> f64 {
        self.0
    }
}

/// Monthly spend attributed to one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpend {
    pub name: String,
    /// Summed monthly-normalized cost
    pub value: f64,
    /// Share of the monthly total in `0.0..=1.0`; zero when the total is zero
    pub weight: f64,
}

impl CategorySpend {
    pub fn percentage(&self) -> f64 {
        self.weight * 100.0
    }
}

/// One point of the trend series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub month: &'static str,
    pub amount: f64,
}

/// Aggregated view of the portfolio at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioAnalytics {
    pub monthly_total: f64,
    pub annual_total: f64,
    /// Sorted by value, largest first
    pub categories: Vec<CategorySpend>,
    pub subscription_count: usize,
    pub active_count: usize,
    pub expiring_count: usize,
    pub expired_count: usize,
    /// Name of the subscription with the highest monthly cost
    pub most_expensive: Option<String>,
    /// Distinct currency labels; totals assume these are all the same
    pub currencies: Vec<String>,
    pub trend: Vec<TrendPoint>,
    pub trend_is_synthetic: bool,
}

impl PortfolioAnalytics {
    /// True when the portfolio mixes currency labels and totals are approximate
    pub fn mixed_currencies(&self) -> bool {
        self.currencies.len() > 1
    }
}

/// Sum of monthly-normalized costs across every subscription, any status
pub fn monthly_total<'a, I>(subscriptions: I) -> f64
where
    I: IntoIterator<Item = &'a Subscription>,
{
    subscriptions.into_iter().map(Subscription::monthly_cost).sum()
}

/// Category → monthly cost, sorted descending (ties by name)
pub fn category_breakdown<'a, I>(subscriptions: I) -> Vec<CategorySpend>
where
    I: IntoIterator<Item = &'a Subscription>,
{
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for sub in subscriptions {
        *totals.entry(sub.category.as_str()).or_insert(0.0) += sub.monthly_cost();
    }

    let total: f64 = totals.values().sum();
    let mut categories: Vec<CategorySpend> = totals
        .into_iter()
        .map(|(name, value)| CategorySpend {
            name: name.to_string(),
            value,
            weight: if total > 0.0 { value / total } else { 0.0 },
        })
        .collect();

    // Stable sort keeps alphabetical order among equal values
    categories.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    categories
}

/// Twelve calendar months of projected spend
pub fn trend(monthly_total: f64, projection: &dyn TrendProjection) -> Vec<TrendPoint> {
    MONTH_LABELS
        .iter()
        .enumerate()
        .map(|(i, &month)| TrendPoint {
            month,
            amount: monthly_total * projection.multiplier(i),
        })
        .collect()
}

/// Compute every dashboard figure for `subscriptions` as of `now`
///
/// Status counts use the status derived at `now`, not the stored copy, so
/// they are never stale between refresh ticks.
pub fn summarize<'a, I>(
    subscriptions: I,
    now: DateTime<Utc>,
    projection: &dyn TrendProjection,
) -> PortfolioAnalytics
where
    I: IntoIterator<Item = &'a Subscription>,
{
    let subs: Vec<&Subscription> = subscriptions.into_iter().collect();

    let monthly_total = monthly_total(subs.iter().copied());
    let categories = category_breakdown(subs.iter().copied());

    let (mut active, mut expiring, mut expired) = (0, 0, 0);
    for sub in &subs {
        match sub.derived_status(now) {
            SubscriptionStatus::Active => active += 1,
            SubscriptionStatus::Expiring => expiring += 1,
            SubscriptionStatus::Expired => expired += 1,
        }
    }

    let most_expensive = subs
        .iter()
        .max_by(|a, b| {
            a.monthly_cost()
                .partial_cmp(&b.monthly_cost())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|s| s.name.clone());

    let mut currencies: Vec<String> = subs.iter().map(|s| s.currency.to_uppercase()).collect();
    currencies.sort();
    currencies.dedup();

    PortfolioAnalytics {
        monthly_total,
        annual_total: monthly_total * 12.0,
        categories,
        subscription_count: subs.len(),
        active_count: active,
        expiring_count: expiring,
        expired_count: expired,
        most_expensive,
        currencies,
        trend: trend(monthly_total, projection),
        trend_is_synthetic: projection.is_synthetic(),
    }
}
