//! Chat completion abstraction and the OpenAI-compatible client.
//!
//! Processors depend on [`CompletionBackend`] only, so tests can substitute a scripted backend.

mod openai;

pub use openai::{OpenAiClient, DEFAULT_BASE_URL, DEFAULT_MODEL};

use crate::session::Turn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message sent to the completion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self::new(turn.role.as_str(), turn.content.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion api error: {0}")]
    Api(String),
    #[error("completion api key not configured")]
    NotConfigured,
    #[error("completion response had empty content")]
    EmptyResponse,
}

/// Hosted chat completion: ordered role/content messages in, assistant text out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}
