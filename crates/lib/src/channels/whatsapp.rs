//! WhatsApp channel: send text messages via the Cloud API `/{phone_number_id}/messages`.

use crate::channels::handle::{ChannelError, ChannelHandle};
use async_trait::async_trait;
use std::time::Duration;

pub const WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v15.0";

/// WhatsApp rejects text bodies of 4096 characters or more.
pub const MAX_BODY_CHARS: usize = 4095;

/// Timeout for one send request.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Truncate `text` to at most [`MAX_BODY_CHARS`] characters.
pub fn truncate_body(text: &str) -> &str {
    match text.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// JSON body for a text message to `to`. The body is truncated to [`MAX_BODY_CHARS`].
pub fn text_message_payload(to: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "body": truncate_body(text) },
    })
}

/// WhatsApp Cloud API sender.
pub struct WhatsAppChannel {
    id: String,
    api_base: String,
    token: Option<String>,
    phone_number_id: Option<String>,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(
        api_base: Option<String>,
        token: Option<String>,
        phone_number_id: Option<String>,
        timeout: Duration,
    ) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| WHATSAPP_API_BASE.to_string());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("whatsapp: falling back to default http client: {}", e);
                reqwest::Client::new()
            });
        Self {
            id: "whatsapp".to_string(),
            api_base,
            token,
            phone_number_id,
            client,
        }
    }

    /// POST a text message. Non-success responses carry status and body.
    pub async fn send_text(&self, to: &str, text: &str) -> Result<(), ChannelError> {
        let token = self
            .token
            .as_deref()
            .ok_or(ChannelError::NotConfigured("whatsapp api token"))?;
        let phone_number_id = self
            .phone_number_id
            .as_deref()
            .ok_or(ChannelError::NotConfigured("whatsapp phone number id"))?;
        let url = format!("{}/{}/messages", self.api_base, phone_number_id);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&text_message_payload(to, text))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelHandle for WhatsAppChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        self.send_text(recipient, text).await
    }
}
