//! Prompt rendering shared by the HTTP backends

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::models::Subscription;
use crate::prompts::{PromptId, PromptLibrary};

/// A prompt ready to send
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub system: Option<String>,
    pub user: String,
}

pub(crate) fn render(
    prompts: &Arc<RwLock<PromptLibrary>>,
    id: PromptId,
    vars: &HashMap<&str, String>,
) -> Result<RenderedPrompt> {
    let mut prompts = prompts
        .write()
        .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
    let prompt = prompts.get(id)?;
    Ok(RenderedPrompt {
        system: prompt.render_system(vars),
        user: prompt.render_user(vars),
    })
}

fn format_date(sub: &Subscription) -> String {
    sub.end_date
        .map(|d| d.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| "an unknown date".to_string())
}

/// One line per subscription for list-style prompts
fn subscription_lines(subscriptions: &[Arc<Subscription>], monthly: bool) -> String {
    subscriptions
        .iter()
        .map(|s| {
            if monthly {
                format!(
                    "- {} [{}]: {:.2} {} {} ({:.2}/month)",
                    s.name,
                    s.category,
                    s.price,
                    s.currency,
                    s.billing_cycle,
                    s.monthly_cost()
                )
            } else {
                format!(
                    "- {}: {:.2} {} ({}), renews {}",
                    s.name,
                    s.price,
                    s.currency,
                    s.billing_cycle,
                    format_date(s)
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn currency_total(subscriptions: &[Arc<Subscription>], amount: impl Fn(&Subscription) -> f64) -> String {
    let total: f64 = subscriptions.iter().map(|s| amount(s.as_ref())).sum();
    let mut currencies: Vec<&str> = subscriptions.iter().map(|s| s.currency.as_str()).collect();
    currencies.sort_unstable();
    currencies.dedup();
    match currencies.as_slice() {
        [single] => format!("{:.2} {}", total, single),
        _ => format!("{:.2} (mixed currencies)", total),
    }
}

pub(crate) fn reminder_vars(sub: &Subscription) -> HashMap<&'static str, String> {
    HashMap::from([
        ("name", sub.name.clone()),
        ("end_date", format_date(sub)),
        ("price", format!("{:.2}", sub.price)),
        ("currency", sub.currency.clone()),
        ("billing_cycle", sub.billing_cycle.to_string()),
    ])
}

pub(crate) fn dues_summary_vars(subscriptions: &[Arc<Subscription>]) -> HashMap<&'static str, String> {
    HashMap::from([
        ("subscriptions", subscription_lines(subscriptions, false)),
        ("total", currency_total(subscriptions, |s| s.price)),
    ])
}

pub(crate) fn parse_vars(input: &str) -> HashMap<&'static str, String> {
    // Keep the quoted input on one line
    let cleaned = input.replace(['\n', '\r'], " ").replace('"', "'");
    HashMap::from([("input", cleaned.trim().to_string())])
}

pub(crate) fn insights_vars(subscriptions: &[Arc<Subscription>]) -> HashMap<&'static str, String> {
    HashMap::from([
        ("subscriptions", subscription_lines(subscriptions, true)),
        ("total", currency_total(subscriptions, Subscription::monthly_cost)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingCycle, SubscriptionStatus};
    use chrono::{TimeZone, Utc};

    fn sub(name: &str, price: f64, currency: &str, cycle: BillingCycle) -> Arc<Subscription> {
        Arc::new(Subscription {
            id: name.to_lowercase(),
            name: name.into(),
            price,
            currency: currency.into(),
            billing_cycle: cycle,
            start_date: None,
            end_date: Some(Utc.with_ymd_and_hms(2024, 6, 17, 9, 0, 0).unwrap()),
            category: "Entertainment".into(),
            status: SubscriptionStatus::Expiring,
            icon: None,
            last_reminder_sent: None,
        })
    }

    #[test]
    fn test_reminder_vars() {
        let vars = reminder_vars(&sub("Netflix", 15.49, "USD", BillingCycle::Monthly));
        assert_eq!(vars["end_date"], "June 17, 2024");
        assert_eq!(vars["price"], "15.49");
        assert_eq!(vars["billing_cycle"], "monthly");
    }

    #[test]
    fn test_dues_summary_totals() {
        let subs = vec![
            sub("Netflix", 15.49, "USD", BillingCycle::Monthly),
            sub("Hulu", 7.99, "USD", BillingCycle::Monthly),
        ];
        let vars = dues_summary_vars(&subs);
        assert_eq!(vars["total"], "23.48 USD");
        assert_eq!(vars["subscriptions"].lines().count(), 2);

        let mixed = vec![sub("A", 1.0, "USD", BillingCycle::Monthly), sub("B", 1.0, "EUR", BillingCycle::Monthly)];
        assert!(dues_summary_vars(&mixed)["total"].contains("mixed"));
    }

    #[test]
    fn test_insights_vars_use_monthly_cost() {
        let subs = vec![sub("Adobe", 120.0, "USD", BillingCycle::Yearly)];
        let vars = insights_vars(&subs);
        assert!(vars["subscriptions"].contains("(10.00/month)"));
        assert_eq!(vars["total"], "10.00 USD");
    }

    #[test]
    fn test_parse_vars_flatten_input() {
        let vars = parse_vars("Netflix \"premium\"\n19.99 monthly");
        assert_eq!(vars["input"], "Netflix 'premium' 19.99 monthly");
    }
}
