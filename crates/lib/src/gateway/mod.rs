//! Gateway: HTTP surface for the Messenger webhook.
//!
//! `GET /` health, `GET /webhook` subscription handshake, `POST /webhook` event batches.

mod server;
mod webhook;

pub use server::{build_dispatcher, router, run_gateway, GatewayState};
pub use webhook::{verify, VerifyQuery, EVENT_RECEIVED};
