//! Prompt templates for the draft backends
//!
//! Each prompt is a markdown file with YAML frontmatter and `# System` /
//! `# User` sections. Lookup order:
//! 1. `<data dir>/subtrack/prompts/overrides/<id>.md`
//! 2. the copy compiled into the binary
//!
//! Placeholders use `{{name}}` and are substituted verbatim.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

mod defaults {
    pub const DRAFT_REMINDER: &str = include_str!("../../../prompts/draft_reminder.md");
    pub const DUES_SUMMARY: &str = include_str!("../../../prompts/dues_summary.md");
    pub const PARSE_SUBSCRIPTION: &str = include_str!("../../../prompts/parse_subscription.md");
    pub const SAVINGS_INSIGHTS: &str = include_str!("../../../prompts/savings_insights.md");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Renewal reminder for one subscription
    DraftReminder,
    /// Consolidated note about everything renewing soon
    DuesSummary,
    /// Free text → subscription fields
    ParseSubscription,
    /// Cost-cutting suggestions across the portfolio
    SavingsInsights,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DraftReminder => "draft_reminder",
            Self::DuesSummary => "dues_summary",
            Self::ParseSubscription => "parse_subscription",
            Self::SavingsInsights => "savings_insights",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[
            Self::DraftReminder,
            Self::DuesSummary,
            Self::ParseSubscription,
            Self::SavingsInsights,
        ]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::DraftReminder => defaults::DRAFT_REMINDER,
            Self::DuesSummary => defaults::DUES_SUMMARY,
            Self::ParseSubscription => defaults::PARSE_SUBSCRIPTION,
            Self::SavingsInsights => defaults::SAVINGS_INSIGHTS,
        }
    }
}

/// Prompt frontmatter
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub version: u32,
    /// Kind of work the prompt asks for (narrative, structured_extraction, ...)
    pub task_type: String,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// Body after the frontmatter
    pub content: String,
    /// Set when loaded from the override directory
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    pub fn is_override(&self) -> bool {
        self.override_path.is_some()
    }

    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the user section, or the whole body if it has no sections
    pub fn render_user(&self, vars: &HashMap<&str, String>) -> String {
        let template = self.user_section().unwrap_or(&self.content);
        substitute(template, vars)
    }

    /// Render the system section, if any
    pub fn render_system(&self, vars: &HashMap<&str, String>) -> Option<String> {
        self.system_section().map(|s| substitute(s, vars))
    }
}

/// Loads and caches prompts
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Library using the default override directory
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Library that ignores overrides
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::InvalidData(format!("prompt {} missing from cache", id.as_str())))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(path) = self.override_path(id).filter(|p| p.exists()) {
            let content = fs::read_to_string(&path)?;
            let (metadata, body) = parse_prompt(&content)?;
            debug!(prompt = id.as_str(), path = %path.display(), "Using prompt override");
            return Ok(Prompt {
                metadata,
                content: body,
                override_path: Some(path),
            });
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            override_path: None,
        })
    }

    fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|d| d.join(format!("{}.md", id.as_str())))
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_path(id).is_some_and(|p| p.exists())
    }

    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }

    /// Forget cached prompts so edited overrides are picked up
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("subtrack").join("prompts").join("overrides"))
}

fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();
    let rest = content.strip_prefix("---").ok_or_else(|| {
        Error::InvalidData("Prompt must start with YAML frontmatter (---)".into())
    })?;

    let end = rest.find("---").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let metadata: PromptMetadata = serde_yaml::from_str(rest[..end].trim())?;
    Ok((metadata, rest[end + 3..].trim().to_string()))
}

fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after = &content[start + header.len()..];
    let end = after.find("\n# ").unwrap_or(after.len());
    Some(after[..end].trim())
}

fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{}}}}}", key), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts_parse_with_matching_ids() {
        for id in PromptId::all() {
            let (metadata, body) = parse_prompt(id.default_content()).unwrap();
            assert_eq!(metadata.id, id.as_str());
            assert!(body.contains("# User"), "{} has no user section", id.as_str());
        }
    }

    #[test]
    fn test_render_user_substitutes_vars() {
        let mut lib = PromptLibrary::embedded_only();
        let prompt = lib.get(PromptId::DraftReminder).unwrap();
        assert!(!prompt.is_override());

        let mut vars = HashMap::new();
        vars.insert("name", "Netflix".to_string());
        vars.insert("end_date", "2024-06-17".to_string());
        vars.insert("price", "15.49".to_string());
        vars.insert("currency", "USD".to_string());
        vars.insert("billing_cycle", "monthly".to_string());

        let rendered = prompt.render_user(&vars);
        assert!(rendered.contains("\"Netflix\" is expiring on 2024-06-17"));
        assert!(rendered.contains("15.49 USD"));
        assert!(!rendered.contains("{{"));
        assert!(!rendered.contains("# System"));
    }

    #[test]
    fn test_override_dir_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("parse_subscription.md"),
            "---\nid: parse_subscription\nversion: 7\ntask_type: structured_extraction\n---\n\n# User\nCustom {{input}}",
        )
        .unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert!(lib.has_override(PromptId::ParseSubscription));
        assert!(!lib.has_override(PromptId::DraftReminder));

        let prompt = lib.get(PromptId::ParseSubscription).unwrap();
        assert_eq!(prompt.metadata.version, 7);
        assert!(prompt.is_override());

        let mut vars = HashMap::new();
        vars.insert("input", "gym 30/month".to_string());
        assert_eq!(prompt.render_user(&vars), "Custom gym 30/month");
    }

    #[test]
    fn test_missing_frontmatter_is_rejected() {
        assert!(parse_prompt("# User\nhello").is_err());
        assert!(parse_prompt("---\nid: x\n# User").is_err());
    }

    #[test]
    fn test_extract_section() {
        let content = "# System\nBe brief.\n\n# User\nHello.";
        assert_eq!(extract_section(content, "# System"), Some("Be brief."));
        assert_eq!(extract_section(content, "# User"), Some("Hello."));
        assert_eq!(extract_section(content, "# Missing"), None);
    }
}
