//! SubTrack Core Library
//!
//! Shared functionality for the SubTrack subscription dashboard:
//! - Subscription lifecycle: cost normalization and status derivation
//! - Shared portfolio state with whole-state swaps
//! - Analytics: totals, category breakdown, trend projection
//! - Reminder dispatch policy and periodic background tasks
//! - Pluggable local AI backends (Ollama, OpenAI-compatible, mock)
//! - Prompt library for customizable AI prompts
//! - Snapshot stores (encrypted SQLite, JSON file, in-memory)

pub mod ai;
pub mod analytics;
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod portfolio;
pub mod prompts;
pub mod reminders;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod sync;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{DraftBackend, DraftClient, MockBackend, MockMode, OllamaBackend, OpenAICompatibleBackend};
pub use analytics::{
    CategorySpend, FlatProjection, PortfolioAnalytics, RandomBand, TrendPoint, TrendProjection,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use lifecycle::{derive_status, monthly_cost, time_remaining, ReminderState, TimeRemaining};
pub use models::{
    BillingCycle, Impact, NewSubscription, ReminderLog, ReminderLogStatus, ReminderType,
    SavingsInsight, Subscription, SubscriptionDraft, SubscriptionStatus,
};
pub use portfolio::{CommitOutcome, Portfolio, PortfolioState, RefreshReport, StatusTransition};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use reminders::{DispatchOutcome, DraftFailure, ReminderDispatcher, SummaryOutcome};
pub use scheduler::PeriodicTask;
pub use session::{LoginOutcome, Session};
pub use store::{Database, JsonFileStore, MemoryStore, Snapshot, SnapshotStore, SCHEMA_VERSION};
pub use sync::{SyncState, Syncer};
