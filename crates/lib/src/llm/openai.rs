//! OpenAI chat completions client (`POST {base}/chat/completions`).

use crate::llm::{ChatMessage, CompletionBackend, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// `timeout` bounds each request; a timed-out request surfaces as [`LlmError::Request`].
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("completion client: falling back to default http client: {}", e);
                reqwest::Client::new()
            });
        Self {
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST /chat/completions, non-streaming.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: ChatResponse = res.json().await?;
        first_choice_content(data)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        log::debug!(
            "completion: {} message(s) to model {}",
            messages.len(),
            self.model
        );
        self.chat(messages).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn first_choice_content(data: ChatResponse) -> Result<String, LlmError> {
    let content = data
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(content)
}
