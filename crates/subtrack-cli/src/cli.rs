//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SubTrack - Keep recurring charges under control
#[derive(Parser)]
#[command(name = "subtrack")]
#[command(about = "Personal subscription tracker with renewal reminders", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "subtrack.db", global = true)]
    pub db: PathBuf,

    /// User id whose snapshot to load
    #[arg(long, env = "SUBTRACK_USER", default_value = "local", global = true)]
    pub user: String,

    /// Config file (defaults to <config dir>/subtrack/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SUBTRACK_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Add a subscription
    Add {
        /// Service name
        #[arg(short, long)]
        name: Option<String>,

        /// Price per billing cycle
        #[arg(short, long)]
        price: Option<f64>,

        /// Billing cycle: weekly, monthly, quarterly, yearly
        #[arg(short, long)]
        cycle: Option<String>,

        /// Currency code (default: USD)
        #[arg(long)]
        currency: Option<String>,

        /// Category label (default: Entertainment)
        #[arg(long)]
        category: Option<String>,

        /// Start date (YYYY-MM-DD, default: today)
        #[arg(long)]
        starts: Option<String>,

        /// Next renewal date (YYYY-MM-DD, default: one month from today)
        #[arg(long)]
        ends: Option<String>,

        /// Display icon hint
        #[arg(long)]
        icon: Option<String>,

        /// Describe the subscription in plain words and let the AI fill the form
        ///
        /// Explicit flags override what the AI extracted.
        #[arg(short, long)]
        describe: Option<String>,
    },

    /// List subscriptions
    List {
        /// Only show subscriptions with this status (active, expiring, expired)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Delete a subscription (reminder history is kept)
    Delete {
        /// Subscription id or name
        id_or_name: String,
    },

    /// Renew a subscription for one more billing cycle
    Renew {
        /// Subscription id or name
        id_or_name: String,
    },

    /// Show spending totals and counts
    Stats,

    /// Show category breakdown and trend
    Analytics {
        /// Seed the illustrative trend for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Renewal reminders
    Remind {
        #[command(subcommand)]
        action: RemindAction,
    },

    /// Ask the AI for ways to cut costs
    Insights,

    /// Run status refresh and reminder scans until Ctrl-C
    Watch,

    /// Export the portfolio to a JSON snapshot file
    Export {
        /// Output file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Replace the portfolio with a JSON snapshot file
    Import {
        /// Input file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show database, backend and sync status
    Status,
}

#[derive(Subcommand)]
pub enum RemindAction {
    /// Send at most one due reminder now
    Scan,

    /// Draft one note covering everything renewing soon
    Summary,

    /// Show reminder history
    Logs {
        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print a mailto: link for a reminder
    Mailto {
        /// Reminder log id (default: most recent)
        id: Option<String>,

        /// Recipient address
        #[arg(long)]
        to: Option<String>,
    },
}
