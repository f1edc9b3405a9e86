//! Connection lifecycle management
//!
//! Owns the single `Session` and keeps it alive under transport churn. One
//! event-loop task is the sole writer of session state; control-surface
//! handlers and relay tasks read through a `ConnectionHandle` or call its
//! `send` entry point. Reconnects are unbounded: this is a long-lived
//! background service and every attempt is independently safe to repeat.

use crate::config::{RECONNECT_BASE_SECS, RECONNECT_FAULT_SECS, RECONNECT_PAIRING_SECS};
use crate::error::{Error, Result};
use crate::pairing;
use crate::session::{ConnectionState, ConnectionStatus, Session};
use crate::transport::{CloseReason, InboundMessage, Transport, TransportEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Consumer of inbound user messages (the relay, in production)
#[async_trait::async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle_inbound(&self, message: InboundMessage);
}

/// Cheap-to-clone read/send handle over the single session
#[derive(Clone)]
pub struct ConnectionHandle {
    session: Arc<RwLock<Session>>,
    transport: Arc<dyn Transport>,
}

impl ConnectionHandle {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            session: Arc::new(RwLock::new(Session::new())),
            transport,
        }
    }

    /// Snapshot of the current session; pure read
    pub async fn status(&self) -> ConnectionStatus {
        self.session.read().await.status()
    }

    /// Pairing image data URL and raw challenge; both None unless pairing
    pub async fn pairing(&self) -> (Option<String>, Option<String>) {
        let session = self.session.read().await;
        (
            session.pairing_image().map(str::to_string),
            session.pairing_challenge().map(str::to_string),
        )
    }

    /// Account identity while connected
    pub async fn identity(&self) -> Option<String> {
        self.session.read().await.identity().map(str::to_string)
    }

    /// Send text through the transport; fails fast when not connected
    pub async fn send(&self, destination: &str, text: &str) -> Result<()> {
        if self.session.read().await.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        self.transport.send_text(destination, text).await
    }

    /// Force the session into connected state without an event loop
    #[cfg(test)]
    pub(crate) async fn establish_for_test(&self, identity: &str) {
        self.session.write().await.establish(identity.to_string());
    }
}

/// Start the event loop driving `handle`'s session from transport events.
///
/// The loop makes an immediate first connect attempt, then reacts to events
/// until the transport's event stream ends.
pub fn spawn(
    handle: ConnectionHandle,
    events: mpsc::Receiver<TransportEvent>,
    handler: Arc<dyn InboundHandler>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(handle, events, handler))
}

async fn run(
    handle: ConnectionHandle,
    mut events: mpsc::Receiver<TransportEvent>,
    handler: Arc<dyn InboundHandler>,
) {
    let (retry_tx, mut retry_rx) = mpsc::channel::<u64>(1);
    let mut driver = Driver {
        session: handle.session,
        transport: handle.transport,
        handler,
        retry_tx,
        retry_pending: false,
        retry_generation: 0,
    };

    driver.attempt_connect().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => driver.apply(event).await,
                None => {
                    info!("Transport event stream ended");
                    break;
                }
            },
            generation = retry_rx.recv() => {
                driver.retry_pending = false;
                if generation != Some(driver.retry_generation) {
                    debug!("Skipping invalidated reconnect timer");
                    continue;
                }
                let state = driver.session.read().await.state();
                if matches!(state, ConnectionState::Disconnected | ConnectionState::Faulted) {
                    driver.attempt_connect().await;
                } else {
                    debug!(state = %state, "Skipping stale reconnect timer");
                }
            }
        }
    }
}

/// Single-writer state machine behind the event loop
struct Driver {
    session: Arc<RwLock<Session>>,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn InboundHandler>,
    retry_tx: mpsc::Sender<u64>,
    retry_pending: bool,
    /// Bumped to invalidate an armed timer (logged-out close)
    retry_generation: u64,
}

impl Driver {
    /// Drive one connect attempt; a failure here must never escape
    async fn attempt_connect(&mut self) {
        self.session.write().await.begin_connecting();
        info!("Connecting to messaging transport");

        if let Err(e) = self.transport.connect().await {
            error!(error = %e, "Connect attempt failed");
            self.session.write().await.fault();
            self.schedule_retry(RECONNECT_FAULT_SECS);
        }
    }

    async fn apply(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PairingRequired { challenge } => {
                let image = match pairing::render_challenge(&challenge) {
                    Ok(image) => Some(image),
                    Err(e) => {
                        warn!(error = %e, "Failed to render pairing image");
                        None
                    }
                };
                self.session.write().await.begin_pairing(challenge, image);
                info!("Pairing required; challenge available on the control surface");
            }

            TransportEvent::Established { identity } => {
                info!(identity = %identity, "Session established");
                self.session.write().await.establish(identity);
            }

            TransportEvent::Closed { reason } => self.handle_close(reason).await,

            TransportEvent::Message(message) => {
                debug!(
                    sender = %message.sender,
                    message_id = %message.message_id,
                    "Inbound message"
                );
                // Handled on its own task so a slow backend never delays the
                // next transport event
                let handler = self.handler.clone();
                tokio::spawn(async move { handler.handle_inbound(message).await });
            }
        }
    }

    async fn handle_close(&mut self, reason: CloseReason) {
        self.session.write().await.disconnect();

        match reason {
            CloseReason::LoggedOut => {
                warn!("Session logged out by the far end; manual re-pairing required");
                // Terminal for this credential set: invalidate any reconnect
                // armed by an earlier close
                self.retry_generation += 1;
                self.retry_pending = false;
            }
            CloseReason::PairingTimeout => {
                info!(
                    delay_secs = RECONNECT_PAIRING_SECS,
                    "Pairing timed out; reconnecting"
                );
                self.schedule_retry(RECONNECT_PAIRING_SECS);
            }
            CloseReason::Other(reason) => {
                info!(
                    reason = %reason,
                    delay_secs = RECONNECT_BASE_SECS,
                    "Transport closed; reconnecting"
                );
                self.schedule_retry(RECONNECT_BASE_SECS);
            }
        }
    }

    /// Arm the reconnect timer; at most one may be outstanding
    fn schedule_retry(&mut self, delay_secs: u64) {
        if self.retry_pending {
            debug!("Reconnect already scheduled");
            return;
        }
        self.retry_pending = true;

        let retry_tx = self.retry_tx.clone();
        let generation = self.retry_generation;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            let _ = retry_tx.send(generation).await;
        });
    }
}
