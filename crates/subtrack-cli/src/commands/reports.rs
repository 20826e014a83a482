//! Report commands (stats, analytics, insights)

use anyhow::{Context, Result};
use subtrack_core::{PortfolioAnalytics, RandomBand, Session};

use super::truncate;

fn print_currency_note(stats: &PortfolioAnalytics) {
    if stats.mixed_currencies() {
        println!(
            "   ⚠️  Mixed currencies ({}); totals add raw amounts without conversion",
            stats.currencies.join(", ")
        );
    }
}

pub fn cmd_stats(session: &Session) -> Result<()> {
    let stats = session.analytics();

    println!();
    println!("📊 Subscription Overview");
    println!("   ─────────────────────────────────────────────");
    println!("   Monthly spend:   {:>10.2}", stats.monthly_total);
    println!("   Annual spend:    {:>10.2}", stats.annual_total);
    println!();
    println!("   Subscriptions:   {:>10}", stats.subscription_count);
    println!("   Active:          {:>10}", stats.active_count);
    println!("   Expiring soon:   {:>10}", stats.expiring_count);
    println!("   Expired:         {:>10}", stats.expired_count);
    if let Some(name) = &stats.most_expensive {
        println!("   Most expensive:  {:>10}", truncate(name, 24));
    }
    print_currency_note(&stats);
    println!();

    Ok(())
}

pub fn cmd_analytics(session: &Session, seed: Option<u64>, json: bool) -> Result<()> {
    let config = session.config();
    let stats = match seed {
        Some(seed) => {
            let projection = RandomBand::seeded(config.trend_low, config.trend_high, seed);
            session.analytics_with(&projection)
        }
        None => session.analytics(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("📂 Spending by Category (monthly)");
    if stats.categories.is_empty() {
        println!("   (no subscriptions)");
    }
    for cat in &stats.categories {
        let bar = "█".repeat((cat.weight * 30.0).round() as usize);
        println!(
            "   {:<18} {:>9.2} {:>5.1}% {}",
            truncate(&cat.name, 18),
            cat.value,
            cat.percentage(),
            bar
        );
    }

    println!();
    if stats.trend_is_synthetic {
        println!("📈 Projected Trend (illustrative, not based on history)");
    } else {
        println!("📈 Projected Trend");
    }
    for point in &stats.trend {
        println!("   {}  {:>9.2}", point.month, point.amount);
    }
    print_currency_note(&stats);
    println!();

    Ok(())
}

pub async fn cmd_insights(session: &Session) -> Result<()> {
    println!("🤖 Looking for savings...");
    let insights = session
        .savings_insights()
        .await
        .context("Could not get insights (is OLLAMA_HOST set?)")?;

    if insights.is_empty() {
        println!("   No suggestions right now.");
        return Ok(());
    }

    let total: f64 = insights.iter().map(|i| i.potential_savings).sum();
    for (n, insight) in insights.iter().enumerate() {
        println!();
        println!(
            "   {}. {} [{} impact, ~{:.2}/month]",
            n + 1,
            insight.title,
            insight.impact.as_str(),
            insight.potential_savings
        );
        println!("      {}", insight.description);
    }
    println!();
    println!("   Potential savings: ~{:.2}/month", total);
    Ok(())
}
