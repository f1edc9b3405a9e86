//! Companion Bridge - WhatsApp relay daemon
//!
//! Connects the external WhatsApp transport helper to the companion backend:
//! inbound user messages are relayed to the backend, replies flow back to the
//! originating user, and a small HTTP control surface exposes connection
//! state, the pairing QR image, and direct/categorized send entry points.

pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod pairing;
pub mod relay;
pub mod schedule;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
