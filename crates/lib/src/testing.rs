//! Test doubles for the collaborator traits.

use crate::channels::{ChannelError, ChannelHandle};
use crate::llm::{ChatMessage, CompletionBackend, LlmError};
use crate::sql::{QueryOutcome, SqlTranslator};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Completion backend that replays scripted replies and records every prompt.
/// An exhausted script (or an `Err` entry) yields an api error.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub async fn push_error(&self, message: &str) {
        self.replies.lock().await.push_back(Err(message.to_string()));
    }

    pub async fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.prompts.lock().await.push(messages.to_vec());
        match self.replies.lock().await.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(LlmError::Api(e)),
            None => Err(LlmError::Api("script exhausted".to_string())),
        }
    }
}

/// Channel that records sends, or fails every send.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingChannel {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl ChannelHandle for RecordingChannel {
    fn id(&self) -> &str {
        "recording"
    }

    async fn send_message(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        if self.fail {
            return Err(ChannelError::Api {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }
}

/// Translator that returns a fixed outcome and records questions.
pub struct FixedTranslator {
    outcome: QueryOutcome,
    questions: Mutex<Vec<String>>,
}

impl FixedTranslator {
    pub fn new(outcome: QueryOutcome) -> Self {
        Self {
            outcome,
            questions: Mutex::new(Vec::new()),
        }
    }

    pub async fn questions(&self) -> Vec<String> {
        self.questions.lock().await.clone()
    }
}

#[async_trait]
impl SqlTranslator for FixedTranslator {
    async fn translate_and_execute(&self, question: &str) -> QueryOutcome {
        self.questions.lock().await.push(question.to_string());
        self.outcome.clone()
    }
}
