//! Cluster labeling
//!
//! Labels are a display nicety produced by a chat model. Any failure
//! falls back to the cluster's first question text, truncated. Labels
//! never block assignment or resolution.

use crate::store::QuestionRecord;
use async_trait::async_trait;
use knowgap_common::config::LabelingConfig;
use knowgap_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Produces a short human-readable label for a cluster's questions
#[async_trait]
pub trait ClusterLabeler: Send + Sync {
    async fn label(&self, questions: &[String]) -> Result<String>;

    fn provider(&self) -> &'static str;
}

/// Deterministic fallback: the first member's text, truncated on a char
/// boundary.
pub fn fallback_label(members: &[QuestionRecord], max_chars: usize) -> Option<String> {
    let first = members.first()?;
    let text = first.content.trim();
    if text.is_empty() {
        return None;
    }

    Some(text.chars().take(max_chars).collect())
}

/// Chat-completion labeler against the OpenAI API
pub struct OpenAiLabeler {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    max_label_chars: usize,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OpenAiLabeler {
    pub fn new(api_key: String, config: &LabelingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: config.model.clone(),
            max_label_chars: config.max_label_chars,
        }
    }

    fn prompt(&self, questions: &[String]) -> String {
        let mut prompt = String::from(
            "Write one short topic label (a few words, no punctuation, no quotes) \
             summarizing what these questions from school parents have in common:\n",
        );
        for q in questions.iter().take(10) {
            prompt.push_str("- ");
            prompt.push_str(q);
            prompt.push('\n');
        }
        prompt
    }
}

#[async_trait]
impl ClusterLabeler for OpenAiLabeler {
    async fn label(&self, questions: &[String]) -> Result<String> {
        if questions.is_empty() {
            return Err(AppError::LabelingError {
                message: "No questions to label".into(),
            });
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: self.prompt(questions),
            }],
            max_tokens: 32,
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LabelingError {
                message: format!("Labeling API returned {status}: {body}"),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let label = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::LabelingError {
                message: "Labeling API returned no content".into(),
            })?;

        Ok(label.chars().take(self.max_label_chars).collect())
    }

    fn provider(&self) -> &'static str {
        "openai"
    }
}

/// Labeler from config. Returns None when no provider is usable, in which
/// case callers rely on the deterministic fallback only.
pub fn create_labeler(config: &LabelingConfig) -> Option<Arc<dyn ClusterLabeler>> {
    match config.provider.as_str() {
        "openai" => match &config.api_key {
            Some(key) if !key.is_empty() => {
                Some(Arc::new(OpenAiLabeler::new(key.clone(), config)))
            }
            _ => {
                tracing::warn!("Labeling provider openai configured without api_key, labels use fallback only");
                None
            }
        },
        "fallback" => None,
        other => {
            tracing::warn!(provider = other, "Unknown labeling provider, labels use fallback only");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(content: &str) -> QuestionRecord {
        QuestionRecord {
            id: Uuid::new_v4(),
            content: content.into(),
            embedding: vec![],
            cluster_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_fallback_uses_first_member() {
        let members = vec![record("when does aftercare close"), record("aftercare hours?")];
        assert_eq!(
            fallback_label(&members, 80).as_deref(),
            Some("when does aftercare close")
        );
    }

    #[test]
    fn test_fallback_truncates_on_char_boundary() {
        let members = vec![record("häagen-dazs day schedule")];
        let label = fallback_label(&members, 6).unwrap();
        assert_eq!(label, "häagen");
    }

    #[test]
    fn test_fallback_empty_cases() {
        assert_eq!(fallback_label(&[], 80), None);
        assert_eq!(fallback_label(&[record("   ")], 80), None);
    }

    #[test]
    fn test_create_labeler_requires_key() {
        let config = LabelingConfig {
            provider: "openai".into(),
            api_key: None,
            api_base: None,
            model: "gpt-4o-mini".into(),
            max_label_chars: 80,
            timeout_secs: 15,
        };
        assert!(create_labeler(&config).is_none());

        let with_key = LabelingConfig {
            api_key: Some("sk-test".into()),
            ..config
        };
        assert!(create_labeler(&with_key).is_some());
    }
}
