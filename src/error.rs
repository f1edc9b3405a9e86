//! Error types for companion-bridge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("transport initialization failed: {0}")]
    TransportInit(String),

    #[error("not connected to the messaging network")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend request timed out")]
    RelayTimeout,

    #[error("backend error: {0}")]
    RelayBackend(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("pairing image rendering failed: {0}")]
    Pairing(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
