//! SubTrack CLI - Subscription tracker
//!
//! Usage:
//!   subtrack init                              Initialize database
//!   subtrack add -n Netflix -p 15.49           Track a subscription
//!   subtrack add --describe "Spotify 9.99/mo"  Let the AI fill the form
//!   subtrack stats                             Spending overview
//!   subtrack watch                             Run background reminders

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use commands::SessionArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let args = SessionArgs {
        db: &cli.db,
        user: &cli.user,
        config: cli.config.as_deref(),
        no_encrypt: cli.no_encrypt,
    };

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&args).await,
        Commands::Add {
            name,
            price,
            cycle,
            currency,
            category,
            starts,
            ends,
            icon,
            describe,
        } => {
            let session = commands::open_session(&args).await?;
            let form = commands::AddForm {
                name,
                price,
                cycle,
                currency,
                category,
                starts,
                ends,
                icon,
                describe,
            };
            commands::cmd_add(&session, form).await
        }
        Commands::List { status } => {
            let session = commands::open_session(&args).await?;
            commands::cmd_list(&session, status.as_deref())
        }
        Commands::Delete { id_or_name } => {
            let session = commands::open_session(&args).await?;
            commands::cmd_delete(&session, &id_or_name).await
        }
        Commands::Renew { id_or_name } => {
            let session = commands::open_session(&args).await?;
            commands::cmd_renew(&session, &id_or_name).await
        }
        Commands::Stats => {
            let session = commands::open_session(&args).await?;
            commands::cmd_stats(&session)
        }
        Commands::Analytics { seed, json } => {
            let session = commands::open_session(&args).await?;
            commands::cmd_analytics(&session, seed, json)
        }
        Commands::Remind { action } => {
            let session = commands::open_session(&args).await?;
            match action {
                RemindAction::Scan => commands::cmd_remind_scan(&session).await,
                RemindAction::Summary => commands::cmd_remind_summary(&session).await,
                RemindAction::Logs { limit } => commands::cmd_remind_logs(&session, limit),
                RemindAction::Mailto { id, to } => {
                    commands::cmd_remind_mailto(&session, id.as_deref(), to.as_deref())
                }
            }
        }
        Commands::Insights => {
            let session = commands::open_session(&args).await?;
            commands::cmd_insights(&session).await
        }
        Commands::Watch => {
            let session = commands::open_session(&args).await?;
            commands::cmd_watch(&session).await
        }
        Commands::Export { file } => {
            let session = commands::open_session(&args).await?;
            commands::cmd_export(&session, &file)
        }
        Commands::Import { file } => {
            let session = commands::open_session(&args).await?;
            commands::cmd_import(&session, &file).await
        }
    }
}
