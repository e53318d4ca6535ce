//! Delivery gateway: route a reply to the live channel or to the log, per configured output mode.
//!
//! Delivery is best-effort: failures are logged as warnings and never returned to the caller.

use crate::channels::{ChannelHandle, WhatsAppChannel};
use crate::config::{self, Config, OutputMode};
use std::sync::Arc;

enum Target {
    Log,
    Channel(Arc<dyn ChannelHandle>),
}

pub struct Delivery {
    target: Target,
}

impl Delivery {
    /// Write replies to the log instead of sending them.
    pub fn log_sink() -> Self {
        Self { target: Target::Log }
    }

    /// Send replies through `handle`.
    pub fn channel(handle: Arc<dyn ChannelHandle>) -> Self {
        Self {
            target: Target::Channel(handle),
        }
    }

    /// Build from config: WhatsApp output uses the Cloud API sender, anything else logs.
    pub fn from_config(config: &Config) -> Self {
        match config.output {
            OutputMode::Log => Self::log_sink(),
            OutputMode::WhatsApp => {
                let wa = &config.whatsapp;
                let token = config::non_empty(&wa.api_token);
                let phone_number_id = config::non_empty(&wa.phone_number_id);
                if token.is_none() || phone_number_id.is_none() {
                    log::warn!("delivery: whatsapp output selected but api token or phone number id is missing; sends will fail");
                }
                Self::channel(Arc::new(WhatsAppChannel::new(
                    wa.api_base.clone(),
                    token,
                    phone_number_id,
                    std::time::Duration::from_secs(wa.timeout_secs),
                )))
            }
        }
    }

    pub fn mode(&self) -> OutputMode {
        match self.target {
            Target::Log => OutputMode::Log,
            Target::Channel(_) => OutputMode::WhatsApp,
        }
    }

    /// Deliver `text` to `sender_id`. Never fails; send errors are logged.
    pub async fn deliver(&self, sender_id: &str, text: &str) {
        match &self.target {
            Target::Log => {
                log::info!("{}", log_line(sender_id, text));
            }
            Target::Channel(handle) => {
                if let Err(e) = handle.send_message(sender_id, text).await {
                    log::warn!(
                        "delivery: {} send to {} failed: {}",
                        handle.id(),
                        sender_id,
                        e
                    );
                }
            }
        }
    }
}

/// Log-sink rendering of a reply. The text is kept whole.
fn log_line(sender_id: &str, text: &str) -> String {
    format!("Response to message from '{}' is: {}", sender_id, text)
}
