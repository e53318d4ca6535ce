//! Outbound messaging channels.
//!
//! The delivery gateway sends through [`ChannelHandle`]; WhatsApp is the only live channel.

mod handle;
mod whatsapp;

pub use handle::{ChannelError, ChannelHandle};
pub use whatsapp::{
    text_message_payload, truncate_body, WhatsAppChannel, MAX_BODY_CHARS, SEND_TIMEOUT,
    WHATSAPP_API_BASE,
};
