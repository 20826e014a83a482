//! Test utilities for subtrack-core
//!
//! A mock Ollama server that answers `/api/generate` based on which prompt
//! template it recognizes, so the real HTTP backend can be exercised end to end.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

#[derive(Default)]
struct MockState {
    failing: AtomicBool,
    generate_calls: AtomicUsize,
}

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Make `/api/generate` answer 500 until reset
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `/api/generate` requests received
    pub fn generate_calls(&self) -> usize {
        self.state.generate_calls.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 2_000_000_000,
        }],
    })
}

/// Ollama generate endpoint
///
/// The markers below match the user sections of the prompts in `prompts/*.md`.
async fn handle_generate(
    State(state): State<Arc<MockState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, StatusCode> {
    state.generate_calls.fetch_add(1, Ordering::SeqCst);
    if state.failing.load(Ordering::SeqCst) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let prompt = &request.prompt;
    let response = if prompt.contains("Parse this subscription description") {
        parse_mock(&quoted_after(prompt, "into a JSON object: \"").unwrap_or_default())
    } else if prompt.contains("Suggest up to 3 concrete ways") {
        insights_mock()
    } else if prompt.contains("consolidated email") {
        summary_mock(prompt)
    } else if prompt.contains("is expiring on") {
        let name = quoted_after(prompt, "subscription to \"").unwrap_or_else(|| "your".into());
        format!(
            "Subject: Your {name} subscription is about to renew\n\n\
             Hi,\n\nJust a heads up that {name} renews in a few days. \
             Renew now to avoid any interruption.\n\nThanks"
        )
    } else {
        String::new()
    };

    Ok(Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    }))
}

fn quoted_after(prompt: &str, marker: &str) -> Option<String> {
    let start = prompt.find(marker)? + marker.len();
    let rest = &prompt[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Wraps the JSON in prose, the way small models tend to answer
fn parse_mock(input: &str) -> String {
    let words: Vec<&str> = input.split_whitespace().collect();
    let name: Vec<&str> = words
        .iter()
        .take_while(|w| !w.starts_with(|c: char| c.is_ascii_digit() || c == '$'))
        .copied()
        .collect();
    let price = words
        .iter()
        .filter_map(|w| w.trim_start_matches('$').parse::<f64>().ok())
        .next();
    let lower = input.to_lowercase();
    let cycle = if lower.contains("year") || lower.contains("annual") {
        "yearly"
    } else if lower.contains("week") {
        "weekly"
    } else if lower.contains("quarter") {
        "quarterly"
    } else {
        "monthly"
    };

    let json = serde_json::json!({
        "name": if name.is_empty() { None } else { Some(name.join(" ")) },
        "price": price,
        "billingCycle": cycle,
        "currency": "USD",
        "category": null,
    });
    format!("Here is the parsed subscription:\n{}\n", json)
}

fn insights_mock() -> String {
    serde_json::json!({
        "insights": [
            {
                "title": "Bundle your streaming services",
                "description": "Several streaming plans overlap; a bundle usually costs less.",
                "impact": "medium",
                "potential_savings": 6.5
            },
            {
                "title": "Review unused services",
                "description": "Cancel anything you have not opened in the last month.",
                "impact": "high",
                "potentialSavings": 12.0
            }
        ]
    })
    .to_string()
}

fn summary_mock(prompt: &str) -> String {
    let count = prompt.lines().filter(|l| l.starts_with("- ")).count();
    format!(
        "Subject: {} subscriptions renew soon\n\nHere is what renews in the next few days.",
        count
    )
}

#[derive(Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{DraftBackend, OllamaBackend};
    use crate::models::{BillingCycle, Impact, NewSubscription};
    use crate::portfolio::Portfolio;
    use chrono::Utc;

    fn sample(name: &str) -> Arc<crate::models::Subscription> {
        let portfolio = Portfolio::new();
        let mut new = NewSubscription::with_defaults(Utc::now());
        new.name = name.to_string();
        new.price = 12.5;
        portfolio.add(new, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_mock_server_health_and_reminder() {
        let server = MockOllamaServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        assert!(backend.health_check().await);
        let text = backend.draft_reminder_email(&sample("Netflix")).await.unwrap();
        assert!(text.starts_with("Subject: Your Netflix subscription"));
        assert_eq!(server.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_server_parse_and_insights() {
        let server = MockOllamaServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        let draft = backend
            .parse_freeform_input("Adobe Creative Cloud $54.99 per month")
            .await
            .unwrap();
        assert_eq!(draft.name.as_deref(), Some("Adobe Creative Cloud"));
        assert_eq!(draft.price, Some(54.99));
        assert_eq!(draft.cycle(), Some(BillingCycle::Monthly));

        let insights = backend.savings_insights(&[sample("Hulu")]).await.unwrap();
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].impact, Impact::Medium);
        assert_eq!(insights[0].potential_savings, 6.5);
    }

    #[tokio::test]
    async fn test_mock_server_failure_mode() {
        let server = MockOllamaServer::start().await;
        server.set_failing(true);
        let backend = OllamaBackend::new(&server.url(), "llama3.2");
        assert!(backend.draft_reminder_email(&sample("Netflix")).await.is_err());
    }
}
