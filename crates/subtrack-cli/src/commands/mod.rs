//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `setup` - Init and shared utilities (open_db, open_session)
//! - `subscriptions` - Add, list, delete, renew
//! - `reports` - Stats, analytics, savings insights
//! - `reminders` - Reminder scan, summary, history, mailto links
//! - `watch` - Foreground run of the background loops
//! - `snapshot` - JSON export/import
//! - `status` - Database, backend and sync status

pub mod reminders;
pub mod reports;
pub mod setup;
pub mod snapshot;
pub mod status;
pub mod subscriptions;
pub mod watch;

// Re-export command functions for main.rs
pub use reminders::*;
pub use reports::*;
pub use setup::*;
pub use snapshot::*;
pub use status::*;
pub use subscriptions::*;
pub use watch::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// First eight characters of an id, enough to pick one out of a list
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
