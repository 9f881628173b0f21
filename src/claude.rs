//! Claude API Client
//!
//! Anthropic messages client used as the reasoning backend for the
//! critical-systems-thinking toolkit and the autonomous loop.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 4096;

/// Anything that can answer a prompt with text.
///
/// The analysis tools, the query interpreter and the autonomous loop only
/// depend on this trait, so they can run against a scripted fake in tests.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Ask a single question, optionally under a system prompt.
    async fn ask(&self, prompt: &str, system: Option<&str>) -> Result<String>;
}

/// Claude API client
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: Option<String>,
    model: String,
}

/// System message block
#[derive(Debug, Serialize)]
struct SystemBlock {
    r#type: String,
    text: String,
}

/// Message in conversation
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// API request
#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<SystemBlock>,
    messages: Vec<Message>,
}

/// API response
#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    r#type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
}

/// Completion result with usage stats
#[derive(Debug, Clone)]
pub struct CompleteResult {
    pub content: String,
    pub model: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ClaudeClient {
    pub fn new(api_key: Option<&str>, model: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.map(|s| s.to_string()),
            model: model.to_string(),
        }
    }

    /// Create from config
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            config.anthropic_api_key.as_deref(),
            &config.default_model,
            config.http_timeout,
        )
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Get model ID from hint
    fn model_id(model: &str) -> &'static str {
        match model.to_lowercase().as_str() {
            "haiku" => "claude-3-5-haiku-20241022",
            "opus" => "claude-3-opus-20240229",
            _ => "claude-sonnet-4-20250514",
        }
    }

    /// Complete a prompt
    ///
    /// # Arguments
    /// * `prompt` - User message
    /// * `system` - Optional system prompt
    /// * `max_tokens` - Max response tokens
    pub async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: usize,
    ) -> Result<CompleteResult> {
        let model_id = Self::model_id(&self.model);

        let system = system
            .filter(|s| !s.is_empty())
            .map(|s| {
                vec![SystemBlock {
                    r#type: "text".to_string(),
                    text: s.to_string(),
                }]
            })
            .unwrap_or_default();

        let request = MessageRequest {
            model: model_id.to_string(),
            max_tokens,
            system,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        debug!("Calling Claude API: model={}, prompt_len={}", model_id, prompt.len());

        let api_key = self.api_key.as_ref()
            .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY not set - reasoning tools unavailable"))?;

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            anyhow::bail!("Claude API error {}: {}", status, text);
        }

        let result: MessageResponse = response.json().await?;

        let content = result
            .content
            .into_iter()
            .filter_map(|b| if b.r#type == "text" { b.text } else { None })
            .collect::<Vec<_>>()
            .join("\n");

        info!(
            "Claude response: model={}, in={}, out={}",
            model_id, result.usage.input_tokens, result.usage.output_tokens
        );

        Ok(CompleteResult {
            content,
            model: model_id.to_string(),
            input_tokens: result.usage.input_tokens,
            output_tokens: result.usage.output_tokens,
        })
    }
}

#[async_trait]
impl Reasoner for ClaudeClient {
    async fn ask(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        Ok(self.complete(prompt, system, DEFAULT_MAX_TOKENS).await?.content)
    }
}
