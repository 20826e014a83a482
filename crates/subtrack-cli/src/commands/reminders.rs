//! Reminder commands (scan, summary, logs, mailto)

use anyhow::{anyhow, Context, Result};
use subtrack_core::{reminders::mailto_link, DispatchOutcome, Session, SummaryOutcome};

use super::{short_id, truncate, warn_if_unsaved};

pub async fn cmd_remind_scan(session: &Session) -> Result<()> {
    let outcome = session
        .run_reminder_scan()
        .await
        .context("Reminders need an AI backend (set OLLAMA_HOST)")?;

    match outcome {
        DispatchOutcome::Idle => println!("✅ Nothing due for a reminder."),
        DispatchOutcome::Busy => println!("⏳ A reminder is already being drafted; try again shortly."),
        DispatchOutcome::Sent {
            subscription_id,
            log_id,
        } => {
            let state = session.state();
            let name = state
                .get(&subscription_id)
                .map(|s| s.name.clone())
                .unwrap_or(subscription_id);
            println!("📧 Reminder drafted for {} (log {})", name, short_id(&log_id));
            if let Some(log) = state.reminder_logs.first() {
                println!();
                println!("{}", log.content);
            }
            warn_if_unsaved(session);
        }
        DispatchOutcome::Failed { error, .. } => {
            println!("❌ Draft failed: {}", error);
            println!("   The subscription stays due and will be retried.");
        }
        DispatchOutcome::Discarded { .. } => println!("⚠️  Draft discarded"),
    }
    Ok(())
}

pub async fn cmd_remind_summary(session: &Session) -> Result<()> {
    match session
        .draft_summary()
        .await
        .context("Failed to draft summary")?
    {
        SummaryOutcome::NothingDue => println!("✅ Nothing renews in the next few days."),
        SummaryOutcome::Drafted(log) => {
            println!("📝 Summary draft (log {})", short_id(&log.id));
            println!();
            println!("{}", log.content);
            warn_if_unsaved(session);
        }
        SummaryOutcome::Discarded => println!("⚠️  Draft discarded"),
    }
    Ok(())
}

pub fn cmd_remind_logs(session: &Session, limit: usize) -> Result<()> {
    let state = session.state();
    if state.reminder_logs.is_empty() {
        println!("No reminders yet.");
        return Ok(());
    }

    println!(
        "{:<10} {:<17} {:<8} {:<10} {:<20} {}",
        "ID", "Sent", "Type", "Status", "Subscription", "Subject"
    );
    println!("{}", "-".repeat(100));
    for log in state.reminder_logs.iter().take(limit) {
        let subscription = match &log.subscription_id {
            Some(id) => state
                .get(id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| format!("(deleted {})", short_id(id))),
            None => "-".to_string(),
        };
        let subject = log.content.lines().next().unwrap_or("");
        println!(
            "{:<10} {:<17} {:<8} {:<10} {:<20} {}",
            short_id(&log.id),
            log.sent_at.format("%Y-%m-%d %H:%M"),
            log.reminder_type.as_str(),
            log.status.as_str(),
            truncate(&subscription, 20),
            truncate(subject.trim_start_matches("Subject:").trim(), 40),
        );
    }
    Ok(())
}

pub fn cmd_remind_mailto(session: &Session, id: Option<&str>, to: Option<&str>) -> Result<()> {
    let state = session.state();
    let log = match id {
        Some(id) => state
            .reminder_logs
            .iter()
            .find(|l| l.id == id || l.id.starts_with(id))
            .ok_or_else(|| anyhow!("No reminder with id '{}'", id))?,
        None => state
            .reminder_logs
            .first()
            .ok_or_else(|| anyhow!("No reminders yet. Run `subtrack remind scan` first."))?,
    };

    println!("{}", mailto_link(&log.content, to.or(log.recipient_email.as_deref())));
    Ok(())
}
