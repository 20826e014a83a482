//! OpenAI-compatible backend
//!
//! Any server implementing `/v1/chat/completions`: vLLM, LocalAI,
//! llama-server, Docker Model Runner and friends.
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: server URL (required)
//! - `OPENAI_COMPATIBLE_MODEL`: model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: bearer token (optional)

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{SavingsInsight, Subscription, SubscriptionDraft};
use crate::prompts::{PromptId, PromptLibrary};

use super::parsing::{parse_draft_text, parse_savings_insights, parse_subscription_draft};
use super::render::{self, RenderedPrompt};
use super::DraftBackend;

#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OpenAICompatibleBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST").ok()?;
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .unwrap_or_else(|_| "gpt-3.5-turbo".to_string());

        let backend = Self::new(&host, &model);
        Some(match std::env::var("OPENAI_COMPATIBLE_API_KEY") {
            Ok(key) if !key.is_empty() => backend.with_api_key(&key),
            _ => backend,
        })
    }

    async fn chat_completion(&self, prompt: RenderedPrompt) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = prompt.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.user,
        });

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.3),
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Draft(format!("OpenAI API error {}: {}", status, body)));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Draft("No choices in chat completion response".into()))?;

        debug!(model = %self.model, "Chat completion response: {}", content);
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl DraftBackend for OpenAICompatibleBackend {
    async fn draft_reminder_email(&self, subscription: &Subscription) -> Result<String> {
        let prompt = render::render(
            &self.prompts,
            PromptId::DraftReminder,
            &render::reminder_vars(subscription),
        )?;
        parse_draft_text(&self.chat_completion(prompt).await?)
    }

    async fn draft_upcoming_dues_summary(&self, expiring: &[Arc<Subscription>]) -> Result<String> {
        let prompt = render::render(
            &self.prompts,
            PromptId::DuesSummary,
            &render::dues_summary_vars(expiring),
        )?;
        parse_draft_text(&self.chat_completion(prompt).await?)
    }

    async fn parse_freeform_input(&self, input: &str) -> Result<SubscriptionDraft> {
        let prompt = render::render(
            &self.prompts,
            PromptId::ParseSubscription,
            &render::parse_vars(input),
        )?;
        Ok(parse_subscription_draft(&self.chat_completion(prompt).await?))
    }

    async fn savings_insights(&self, subscriptions: &[Arc<Subscription>]) -> Result<Vec<SavingsInsight>> {
        let prompt = render::render(
            &self.prompts,
            PromptId::SavingsInsights,
            &render::insights_vars(subscriptions),
        )?;
        Ok(parse_savings_insights(&self.chat_completion(prompt).await?))
    }

    async fn health_check(&self) -> bool {
        // /v1/models is standard; /health covers LocalAI and Docker Model Runner
        for path in ["/v1/models", "/health"] {
            if let Ok(resp) = self
                .http_client
                .get(format!("{}{}", self.base_url, path))
                .send()
                .await
            {
                if resp.status().is_success() {
                    return true;
                }
            }
        }
        false
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
