//! Helpers for turning raw model output into domain values
//!
//! Models often wrap JSON in prose or code fences, so extraction looks for
//! the outermost `{...}` / `[...]` span instead of parsing the whole reply.
//! Structured parsers never fail: unusable output yields an empty value and
//! a warning.

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{SavingsInsight, SubscriptionDraft};

fn truncate_raw(raw: &str) -> String {
    if raw.chars().count() > 200 {
        format!("{}...", raw.chars().take(200).collect::<String>())
    } else {
        raw.to_string()
    }
}

fn extract_between(response: &str, open: char, close: char) -> Option<&str> {
    let start = response.find(open)?;
    let end = response.rfind(close)?;
    (start < end).then(|| &response[start..=end])
}

/// Outermost JSON object in a model reply
pub fn extract_json_object(response: &str) -> Option<&str> {
    extract_between(response.trim(), '{', '}')
}

/// Outermost JSON array in a model reply
pub fn extract_json_array(response: &str) -> Option<&str> {
    extract_between(response.trim(), '[', ']')
}

/// Free-text draft: trimmed, empty output is an error
pub fn parse_draft_text(response: &str) -> Result<String> {
    let text = response.trim();
    if text.is_empty() {
        return Err(Error::Draft("backend returned an empty draft".into()));
    }
    Ok(text.to_string())
}

/// Subscription fields from a parse reply; empty draft when unusable
pub fn parse_subscription_draft(response: &str) -> SubscriptionDraft {
    let Some(json) = extract_json_object(response) else {
        warn!(raw = %truncate_raw(response), "No JSON object in parse response");
        return SubscriptionDraft::default();
    };

    match serde_json::from_str::<SubscriptionDraft>(json) {
        Ok(draft) => draft,
        Err(e) => {
            warn!(error = %e, raw = %truncate_raw(json), "Invalid subscription JSON from backend");
            SubscriptionDraft::default()
        }
    }
}

#[derive(Deserialize)]
struct InsightsEnvelope {
    insights: Vec<SavingsInsight>,
}

/// Savings insights from a reply; accepts a bare array or `{"insights": [...]}`
pub fn parse_savings_insights(response: &str) -> Vec<SavingsInsight> {
    if let Some(json) = extract_json_array(response) {
        if let Ok(insights) = serde_json::from_str::<Vec<SavingsInsight>>(json) {
            return insights;
        }
    }

    if let Some(json) = extract_json_object(response) {
        if let Ok(envelope) = serde_json::from_str::<InsightsEnvelope>(json) {
            return envelope.insights;
        }
    }

    warn!(raw = %truncate_raw(response), "Could not parse savings insights");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingCycle, Impact};

    #[test]
    fn test_parse_subscription_draft_with_surrounding_text() {
        let response = r#"Sure! Here you go:
```json
{"name": "Spotify Family", "price": 16.99, "billingCycle": "Monthly", "currency": "usd", "category": null}
```"#;
        let draft = parse_subscription_draft(response);
        assert_eq!(draft.name.as_deref(), Some("Spotify Family"));
        assert_eq!(draft.price, Some(16.99));
        assert_eq!(draft.cycle(), Some(BillingCycle::Monthly));
        assert!(draft.category.is_none());
    }

    #[test]
    fn test_parse_subscription_draft_snake_case_alias() {
        let draft = parse_subscription_draft(r#"{"name": "Gym", "billing_cycle": "yearly"}"#);
        assert_eq!(draft.cycle(), Some(BillingCycle::Yearly));
    }

    #[test]
    fn test_parse_subscription_draft_garbage_is_empty() {
        assert!(parse_subscription_draft("I could not find anything").is_empty());
        assert!(parse_subscription_draft("{not json}").is_empty());
        assert!(parse_subscription_draft("").is_empty());
    }

    #[test]
    fn test_parse_savings_insights_array_and_envelope() {
        let array = r#"[{"title": "Go yearly", "description": "Switch Netflix to annual", "impact": "medium", "potentialSavings": 3.5}]"#;
        let insights = parse_savings_insights(array);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].impact, Impact::Medium);
        assert!((insights[0].potential_savings - 3.5).abs() < 1e-9);

        let envelope = format!(r#"{{"insights": {}}}"#, array);
        assert_eq!(parse_savings_insights(&envelope).len(), 1);

        assert!(parse_savings_insights("no suggestions today").is_empty());
    }

    #[test]
    fn test_parse_draft_text() {
        assert_eq!(parse_draft_text("  Subject: Hi\n\nBody \n").unwrap(), "Subject: Hi\n\nBody");
        assert!(matches!(parse_draft_text("   \n"), Err(Error::Draft(_))));
    }
}
