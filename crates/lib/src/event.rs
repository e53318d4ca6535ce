//! Inbound webhook event model.
//!
//! Parses a WhatsApp Cloud API webhook body into a validated [`InboundEvent`]. Parsing either
//! fully succeeds or fails with one [`ValidationError`]; no partially-built event is returned.
//!
//! Payload shape: <https://developers.facebook.com/docs/whatsapp/cloud-api/webhooks/payload-examples#text-messages>

use serde_json::Value;

/// Value of `messaging_product` for WhatsApp events.
const MESSAGING_PRODUCT: &str = "whatsapp";

/// Reasons a webhook body is rejected. Each maps to a 400 response at the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("unsupported messaging product: {0}")]
    UnsupportedProvider(String),
    #[error("unsupported message kind: {0}")]
    UnsupportedMessageKind(String),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

/// Content of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text { body: String },
    /// Emoji reaction to an earlier message. Recognized but not acted upon.
    Reaction { message_id: String, emoji: String },
}

/// A validated webhook delivery carrying exactly one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Sender address (`messages[0].from`), e.g. a phone number.
    pub sender_id: String,
    /// Business phone number id from `metadata.phone_number_id`, when the payload carries metadata.
    pub phone_uid: Option<String>,
    /// Display phone number from `metadata.display_phone_number`, when present.
    pub display_number: Option<String>,
    /// Provider timestamp token; kept as sent.
    pub received_at: String,
    pub message: MessageContent,
}

impl InboundEvent {
    /// Validate and model a raw webhook body. See [`parse`].
    pub fn parse(raw: &Value) -> Result<Self, ValidationError> {
        parse(raw)
    }

    /// Text body when the message is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.message {
            MessageContent::Text { body } => Some(body),
            MessageContent::Reaction { .. } => None,
        }
    }
}

/// Validate and model a raw webhook body.
///
/// Steps, in order: `entry[0].changes[0].value`, `messaging_product`, optional `metadata`,
/// `messages[0]`, message `type`, then the kind-specific fields.
pub fn parse(raw: &Value) -> Result<InboundEvent, ValidationError> {
    let value = raw
        .get("entry")
        .and_then(|e| e.get(0))
        .and_then(|e| e.get("changes"))
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("value"))
        .ok_or_else(|| envelope("missing entry[0].changes[0].value"))?;

    let product = value
        .get("messaging_product")
        .ok_or_else(|| envelope("missing messaging_product"))?;
    if product.as_str() != Some(MESSAGING_PRODUCT) {
        return Err(ValidationError::UnsupportedProvider(product.to_string()));
    }

    let (display_number, phone_uid) = match value.get("metadata") {
        None => (None, None),
        Some(meta) => {
            let display = string_field(meta, "display_phone_number")
                .ok_or_else(|| envelope("missing metadata.display_phone_number"))?;
            let uid = string_field(meta, "phone_number_id")
                .ok_or_else(|| envelope("missing metadata.phone_number_id"))?;
            (Some(display), Some(uid))
        }
    };

    let message = value
        .get("messages")
        .and_then(|m| m.get(0))
        .ok_or_else(|| envelope("missing messages[0]"))?;

    let kind = message
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::UnsupportedMessageKind("missing type".to_string()))?;

    let content = match kind {
        "text" => {
            let body = message
                .get("text")
                .and_then(|t| t.get("body"))
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("missing text.body"))?;
            MessageContent::Text {
                body: body.to_string(),
            }
        }
        "reaction" => {
            let reaction = message
                .get("reaction")
                .ok_or_else(|| malformed("missing reaction"))?;
            MessageContent::Reaction {
                message_id: string_field(reaction, "message_id")
                    .ok_or_else(|| malformed("missing reaction.message_id"))?,
                emoji: string_field(reaction, "emoji").unwrap_or_default(),
            }
        }
        other => return Err(ValidationError::UnsupportedMessageKind(other.to_string())),
    };

    let received_at = message
        .get("timestamp")
        .and_then(timestamp_token)
        .ok_or_else(|| malformed("missing timestamp"))?;
    let sender_id = string_field(message, "from").ok_or_else(|| malformed("missing from"))?;

    Ok(InboundEvent {
        sender_id,
        phone_uid,
        display_number,
        received_at,
        message: content,
    })
}

fn envelope(detail: &str) -> ValidationError {
    ValidationError::MalformedEnvelope(detail.to_string())
}

fn malformed(detail: &str) -> ValidationError {
    ValidationError::MalformedMessage(detail.to_string())
}

fn string_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// WhatsApp sends timestamps as decimal strings; accept bare numbers too.
fn timestamp_token(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
