//! Subscription management commands (add, list, delete, renew)

use anyhow::{anyhow, bail, Context, Result};
use subtrack_core::{
    lifecycle, BillingCycle, NewSubscription, Session, SubscriptionStatus, SyncState,
};

use super::{short_id, truncate};

/// Flags accepted by `subtrack add`
#[derive(Debug, Default)]
pub struct AddForm {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub cycle: Option<String>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub starts: Option<String>,
    pub ends: Option<String>,
    pub icon: Option<String>,
    pub describe: Option<String>,
}

fn parse_date(flag: &str, value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    lifecycle::parse_timestamp(value)
        .ok_or_else(|| anyhow!("Invalid --{} date '{}'. Use YYYY-MM-DD.", flag, value))
}

/// Turn the flags into a new subscription, starting from the AI draft if any
pub async fn build_new_subscription(session: &Session, form: AddForm) -> Result<NewSubscription> {
    let mut new = match &form.describe {
        Some(text) => {
            println!("🤖 Reading description...");
            session
                .parse_freeform(text)
                .await
                .context("Could not parse the description (is OLLAMA_HOST set?)")?
        }
        None => NewSubscription::with_defaults(session.clock().now()),
    };

    if let Some(name) = form.name {
        new.name = name;
    }
    if let Some(price) = form.price {
        new.price = price;
    }
    if let Some(cycle) = form.cycle {
        new.billing_cycle = cycle
            .parse::<BillingCycle>()
            .map_err(|e| anyhow!("{}. Use weekly, monthly, quarterly or yearly.", e))?;
    }
    if let Some(currency) = form.currency {
        new.currency = currency;
    }
    if let Some(category) = form.category {
        new.category = category;
    }
    if let Some(starts) = form.starts {
        new.start_date = parse_date("starts", &starts)?;
    }
    if let Some(ends) = form.ends {
        new.end_date = parse_date("ends", &ends)?;
    }
    if form.icon.is_some() {
        new.icon = form.icon;
    }

    if new.name.trim().is_empty() {
        bail!("A name is required (--name, or --describe with a recognizable service)");
    }
    Ok(new)
}

pub async fn cmd_add(session: &Session, form: AddForm) -> Result<()> {
    let new = build_new_subscription(session, form).await?;
    let sub = session.add(new).await.context("Failed to add subscription")?;

    println!("✅ Added {} ({})", sub.name, short_id(&sub.id));
    println!(
        "   {:.2} {} {} → {:.2}/month",
        sub.price,
        sub.currency,
        sub.billing_cycle,
        sub.monthly_cost()
    );
    if let Some(end) = sub.end_date {
        println!("   Renews: {} ({})", end.format("%Y-%m-%d"), sub.status);
    }
    warn_if_unsaved(session);
    Ok(())
}

pub fn cmd_list(session: &Session, status: Option<&str>) -> Result<()> {
    let filter = match status.map(|s| s.to_lowercase()) {
        None => None,
        Some(s) if s == "active" => Some(SubscriptionStatus::Active),
        Some(s) if s == "expiring" => Some(SubscriptionStatus::Expiring),
        Some(s) if s == "expired" => Some(SubscriptionStatus::Expired),
        Some(s) => bail!("Unknown status '{}'. Use active, expiring or expired.", s),
    };

    let now = session.clock().now();
    let state = session.state();
    let subs: Vec<_> = state
        .iter()
        .filter(|s| filter.map_or(true, |f| s.derived_status(now) == f))
        .collect();

    if subs.is_empty() {
        println!("No subscriptions.");
        return Ok(());
    }

    println!(
        "{:<10} {:<24} {:>10} {:<5} {:<10} {:>9} {:<9} {:<16} {}",
        "ID", "Name", "Price", "Cur", "Cycle", "Monthly", "Status", "Renews in", "Category"
    );
    println!("{}", "-".repeat(112));
    for sub in subs {
        let remaining = sub
            .time_remaining(now)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<24} {:>10.2} {:<5} {:<10} {:>9.2} {:<9} {:<16} {}",
            short_id(&sub.id),
            truncate(&sub.name, 24),
            sub.price,
            truncate(&sub.currency, 5),
            sub.billing_cycle,
            sub.monthly_cost(),
            sub.derived_status(now),
            remaining,
            truncate(&sub.category, 20),
        );
    }
    Ok(())
}

pub async fn cmd_delete(session: &Session, id_or_name: &str) -> Result<()> {
    let sub = session
        .delete(id_or_name)
        .await
        .with_context(|| format!("Failed to delete '{}'", id_or_name))?;
    println!("🗑️  Deleted {} ({})", sub.name, short_id(&sub.id));
    warn_if_unsaved(session);
    Ok(())
}

pub async fn cmd_renew(session: &Session, id_or_name: &str) -> Result<()> {
    let sub = session
        .renew(id_or_name)
        .await
        .with_context(|| format!("Failed to renew '{}'", id_or_name))?;
    let end = sub
        .end_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("🔄 Renewed {} until {} ({})", sub.name, end, sub.status);
    warn_if_unsaved(session);
    Ok(())
}

/// Print a note when the last save did not go through
pub fn warn_if_unsaved(session: &Session) {
    if let SyncState::Failed { message, .. } = session.sync_state() {
        println!("   ⚠️  Not saved: {}", message);
    }
}
