//! Shared test fixtures for the integration tests

#![allow(dead_code)]

use companion_bridge::connection::InboundHandler;
use companion_bridge::error::Result;
use companion_bridge::transport::{InboundMessage, Transport};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Transport double that records every send and always connects
pub struct MockTransport {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub async fn sent_snapshot(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }
}

/// Inbound handler that drops everything (for tests that only exercise the
/// lifecycle side)
pub struct NullHandler;

#[async_trait::async_trait]
impl InboundHandler for NullHandler {
    async fn handle_inbound(&self, _message: InboundMessage) {}
}

/// Poll `condition` until it holds or a 5s deadline passes
pub async fn wait_for<F, Fut>(condition: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
