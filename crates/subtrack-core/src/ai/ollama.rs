//! Ollama backend
//!
//! Talks to `/api/generate` with `stream: false` and feeds the reply through
//! the parsing helpers.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::models::{SavingsInsight, Subscription, SubscriptionDraft};
use crate::prompts::{PromptId, PromptLibrary};

use super::parsing::{parse_draft_text, parse_savings_insights, parse_subscription_draft};
use super::render::{self, RenderedPrompt};
use super::DraftBackend;

#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }

    async fn generate(&self, prompt: RenderedPrompt) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.user,
            system: prompt.system,
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(model = %self.model, "Ollama response: {}", ollama_response.response);
        Ok(ollama_response.response)
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl DraftBackend for OllamaBackend {
    async fn draft_reminder_email(&self, subscription: &Subscription) -> Result<String> {
        let prompt = render::render(
            &self.prompts,
            PromptId::DraftReminder,
            &render::reminder_vars(subscription),
        )?;
        parse_draft_text(&self.generate(prompt).await?)
    }

    async fn draft_upcoming_dues_summary(&self, expiring: &[Arc<Subscription>]) -> Result<String> {
        let prompt = render::render(
            &self.prompts,
            PromptId::DuesSummary,
            &render::dues_summary_vars(expiring),
        )?;
        parse_draft_text(&self.generate(prompt).await?)
    }

    async fn parse_freeform_input(&self, input: &str) -> Result<SubscriptionDraft> {
        let prompt = render::render(
            &self.prompts,
            PromptId::ParseSubscription,
            &render::parse_vars(input),
        )?;
        Ok(parse_subscription_draft(&self.generate(prompt).await?))
    }

    async fn savings_insights(&self, subscriptions: &[Arc<Subscription>]) -> Result<Vec<SavingsInsight>> {
        let prompt = render::render(
            &self.prompts,
            PromptId::SavingsInsights,
            &render::insights_vars(subscriptions),
        )?;
        Ok(parse_savings_insights(&self.generate(prompt).await?))
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_missing_system() {
        let request = OllamaRequest {
            model: "llama3.2".into(),
            prompt: "hi".into(),
            system: None,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
        assert_eq!(backend.model(), "llama3.2");
    }

    #[tokio::test]
    async fn test_health_check_unreachable_host() {
        let backend = OllamaBackend::new("http://127.0.0.1:1", "llama3.2");
        assert!(!backend.health_check().await);
    }
}
