//! Inbound message relay to the companion backend
//!
//! Each inbound message becomes at most one backend call and at most one
//! outbound reply. Failures degrade to a fixed apology; nothing in here may
//! propagate an error back into the transport's event-handling path.

use crate::config::Config;
use crate::connection::{ConnectionHandle, InboundHandler};
use crate::error::{Error, Result};
use crate::transport::InboundMessage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Reply sent to the user when the backend cannot be reached
pub const APOLOGY_TEXT: &str =
    "Sorry, I'm having trouble thinking right now. Please try again in a moment.";

/// Request body for the backend's message-processing endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RelayRequest {
    pub phone_number: String,
    pub message: String,
    pub message_id: String,
    pub timestamp: i64,
}

/// Backend response; `suggested_tasks` belongs to the dashboard and is
/// deliberately not interpreted here
#[derive(Debug, Clone, Deserialize)]
pub struct RelayResponse {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub suggested_tasks: Option<serde_json::Value>,
}

/// Relay between the transport event stream and the backend
#[derive(Clone)]
pub struct MessageRelay {
    client: reqwest::Client,
    endpoint: String,
    connection: ConnectionHandle,
}

impl MessageRelay {
    pub fn new(config: &Config, connection: ConnectionHandle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.relay_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/api/whatsapp/process",
                config.backend_url.trim_end_matches('/')
            ),
            connection,
        })
    }

    /// Relay one inbound message end to end. Infallible by contract: every
    /// failure path ends in a log line, not an error.
    pub async fn relay(&self, message: InboundMessage) {
        if self.is_own_message(&message).await {
            debug!(message_id = %message.message_id, "Suppressing echo of own message");
            return;
        }

        match self.call_backend(&message).await {
            Ok(Some(reply)) => {
                if let Err(e) = self.connection.send(&message.sender, &reply).await {
                    error!(sender = %message.sender, error = %e, "Failed to send reply");
                }
            }
            Ok(None) => {
                debug!(sender = %message.sender, "Backend returned no reply");
            }
            Err(e) => {
                warn!(sender = %message.sender, error = %e, "Relay failed, sending apology");
                if let Err(e) = self.connection.send(&message.sender, APOLOGY_TEXT).await {
                    error!(sender = %message.sender, error = %e, "Failed to send apology");
                }
            }
        }
    }

    /// A message from the bridge's own account must never loop back through
    /// the backend
    async fn is_own_message(&self, message: &InboundMessage) -> bool {
        if message.from_me {
            return true;
        }
        match self.connection.identity().await {
            Some(identity) => identity == message.sender,
            None => false,
        }
    }

    async fn call_backend(&self, message: &InboundMessage) -> Result<Option<String>> {
        let request = RelayRequest {
            phone_number: message.sender.clone(),
            message: message.text.clone(),
            message_id: message.message_id.clone(),
            timestamp: message.timestamp,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::RelayTimeout
                } else {
                    Error::Http(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::RelayBackend(format!(
                "backend returned {}",
                response.status()
            )));
        }

        let parsed: RelayResponse = response
            .json()
            .await
            .map_err(|e| Error::RelayBackend(format!("malformed backend response: {}", e)))?;

        Ok(parsed.reply.filter(|reply| !reply.is_empty()))
    }
}

#[async_trait::async_trait]
impl InboundHandler for MessageRelay {
    async fn handle_inbound(&self, message: InboundMessage) {
        self.relay(message).await;
    }
}
