//! Gateway: the HTTP surface the messaging provider talks to.
//!
//! `GET /webhook` answers the subscription handshake; `POST /webhook` validates events and
//! hands them to the dispatcher without waiting for processing.

mod server;
mod signature;

pub use server::{router, run_gateway, GatewayState};
pub use signature::{sign, verify_signature, SIGNATURE_HEADER};
