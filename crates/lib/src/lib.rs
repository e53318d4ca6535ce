//! WhatsGPT core library: WhatsApp webhook events in, chat completion or NL-to-SQL answers out.

pub mod agent;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod data_query;
pub mod delivery;
pub mod dispatch;
pub mod event;
pub mod gateway;
pub mod llm;
pub mod session;
pub mod sql;

#[cfg(test)]
mod testing;
