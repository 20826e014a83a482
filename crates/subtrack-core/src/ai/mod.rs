//! Pluggable text-generation backends
//!
//! Reminder drafts, free-text parsing and savings suggestions all go through
//! a [`DraftBackend`]. The core never talks to a model directly.
//!
//! - `DraftBackend` trait: the operations the core needs
//! - `DraftClient` enum: Clone + static dispatch over the concrete backends
//! - Backends: `OllamaBackend`, `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: ollama (default), openai_compatible, mock
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama)
//! - `OLLAMA_MODEL`: model name (default: llama3.2)
//! - `OPENAI_COMPATIBLE_HOST`: server URL (required for openai_compatible)
//! - `OPENAI_COMPATIBLE_MODEL`: model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: bearer token, optional

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod render;

pub use mock::{MockBackend, MockMode};
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{SavingsInsight, Subscription, SubscriptionDraft};

#[async_trait]
pub trait DraftBackend: Send + Sync {
    /// Reminder text for one subscription that is about to renew
    ///
    /// Empty output is reported as an error.
    async fn draft_reminder_email(&self, subscription: &Subscription) -> Result<String>;

    /// One consolidated note covering every subscription in `expiring`
    async fn draft_upcoming_dues_summary(&self, expiring: &[Arc<Subscription>]) -> Result<String>;

    /// Extract subscription fields from free text
    ///
    /// Fields the backend cannot find are left `None`; an unusable reply
    /// yields an empty draft rather than an error.
    async fn parse_freeform_input(&self, input: &str) -> Result<SubscriptionDraft>;

    /// Cost-cutting suggestions; unusable output yields an empty list
    async fn savings_insights(&self, subscriptions: &[Arc<Subscription>]) -> Result<Vec<SavingsInsight>>;

    async fn health_check(&self) -> bool;

    fn model(&self) -> &str;

    fn host(&self) -> &str;
}

#[derive(Clone)]
pub enum DraftClient {
    Ollama(OllamaBackend),
    /// vLLM, LocalAI, llama-server, Docker Model Runner, ...
    OpenAICompatible(OpenAICompatibleBackend),
    Mock(MockBackend),
}

impl DraftClient {
    /// Select a backend from `AI_BACKEND`
    ///
    /// Returns `None` when the selected backend's host variable is unset.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(DraftClient::Ollama),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(DraftClient::OpenAICompatible)
            }
            "mock" => Some(DraftClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(DraftClient::Ollama)
            }
        }
    }

    pub fn ollama(host: &str, model: &str) -> Self {
        DraftClient::Ollama(OllamaBackend::new(host, model))
    }

    pub fn mock() -> Self {
        DraftClient::Mock(MockBackend::new())
    }

    /// Short backend label for status output
    pub fn kind(&self) -> &'static str {
        match self {
            DraftClient::Ollama(_) => "ollama",
            DraftClient::OpenAICompatible(_) => "openai_compatible",
            DraftClient::Mock(_) => "mock",
        }
    }
}

#[async_trait]
impl DraftBackend for DraftClient {
    async fn draft_reminder_email(&self, subscription: &Subscription) -> Result<String> {
        match self {
            DraftClient::Ollama(b) => b.draft_reminder_email(subscription).await,
            DraftClient::OpenAICompatible(b) => b.draft_reminder_email(subscription).await,
            DraftClient::Mock(b) => b.draft_reminder_email(subscription).await,
        }
    }

    async fn draft_upcoming_dues_summary(&self, expiring: &[Arc<Subscription>]) -> Result<String> {
        match self {
            DraftClient::Ollama(b) => b.draft_upcoming_dues_summary(expiring).await,
            DraftClient::OpenAICompatible(b) => b.draft_upcoming_dues_summary(expiring).await,
            DraftClient::Mock(b) => b.draft_upcoming_dues_summary(expiring).await,
        }
    }

    async fn parse_freeform_input(&self, input: &str) -> Result<SubscriptionDraft> {
        match self {
            DraftClient::Ollama(b) => b.parse_freeform_input(input).await,
            DraftClient::OpenAICompatible(b) => b.parse_freeform_input(input).await,
            DraftClient::Mock(b) => b.parse_freeform_input(input).await,
        }
    }

    async fn savings_insights(&self, subscriptions: &[Arc<Subscription>]) -> Result<Vec<SavingsInsight>> {
        match self {
            DraftClient::Ollama(b) => b.savings_insights(subscriptions).await,
            DraftClient::OpenAICompatible(b) => b.savings_insights(subscriptions).await,
            DraftClient::Mock(b) => b.savings_insights(subscriptions).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            DraftClient::Ollama(b) => b.health_check().await,
            DraftClient::OpenAICompatible(b) => b.health_check().await,
            DraftClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            DraftClient::Ollama(b) => b.model(),
            DraftClient::OpenAICompatible(b) => b.model(),
            DraftClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            DraftClient::Ollama(b) => b.host(),
            DraftClient::OpenAICompatible(b) => b.host(),
            DraftClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_client_mock() {
        let client = DraftClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
        assert_eq!(client.kind(), "mock");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        assert!(DraftClient::mock().health_check().await);
    }

    #[tokio::test]
    async fn test_mock_parse_freeform() {
        let draft = DraftClient::mock()
            .parse_freeform_input("Netflix $15.49 monthly")
            .await
            .unwrap();
        assert_eq!(draft.name.as_deref(), Some("Netflix"));
        assert_eq!(draft.price, Some(15.49));
    }
}
