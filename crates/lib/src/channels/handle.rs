//! Outbound channel seam used by the delivery gateway.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("send failed with status {status}: {body}")]
    Api { status: u16, body: String },
}

/// A live messaging channel that can deliver text to a recipient.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "whatsapp").
    fn id(&self) -> &str;
    /// Send a text message to a recipient address.
    async fn send_message(&self, recipient: &str, text: &str) -> Result<(), ChannelError>;
}
