//! Transport capability boundary
//!
//! The WhatsApp protocol itself (pairing handshake, encrypted session
//! continuity, credential persistence) lives in an external helper process.
//! This module defines what the bridge consumes from it: a `Transport`
//! capability for connecting and sending, and a stream of `TransportEvent`s.
//! `SubprocessTransport` is the shipped adapter: it spawns the helper and
//! bridges JSON Lines over stdio onto the event channel.

use crate::config::Config;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Buffered events/commands between the bridge and the helper
const CHANNEL_CAPACITY: usize = 100;

/// One user-originated message instance
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Normalized sender address (JID suffixes stripped)
    pub sender: String,
    pub text: String,
    pub message_id: String,
    /// Transport-assigned epoch seconds
    pub timestamp: i64,
    /// Authored by the bridge's own account
    pub from_me: bool,
}

/// Why the transport closed, as far as reconnect policy cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The far end revoked this credential set; retrying is pointless
    LoggedOut,
    /// Nobody scanned the pairing challenge in time
    PairingTimeout,
    Other(String),
}

/// Lifecycle and message events delivered by the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PairingRequired { challenge: String },
    Established { identity: String },
    Closed { reason: CloseReason },
    Message(InboundMessage),
}

/// Capability the bridge holds over the messaging network
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Begin (or restart) a connection attempt on the underlying client
    async fn connect(&self) -> Result<()>;

    /// Deliver text to a destination; only meaningful while connected
    async fn send_text(&self, destination: &str, text: &str) -> Result<()>;
}

static LOGGED_OUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)logged[ _-]?out|\b401\b|unauthorized").expect("invalid regex"));

static PAIRING_TIMEOUT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bqr\b|pairing|timed[ _-]?out|timeout|\b408\b").expect("invalid regex")
});

/// Classify a raw close-reason string from the helper
pub fn classify_close_reason(raw: &str) -> CloseReason {
    if LOGGED_OUT_RE.is_match(raw) {
        CloseReason::LoggedOut
    } else if PAIRING_TIMEOUT_RE.is_match(raw) {
        CloseReason::PairingTimeout
    } else {
        CloseReason::Other(raw.to_string())
    }
}

/// Strip device and server suffixes from a transport address
/// ("16175551234:12@s.whatsapp.net" -> "16175551234")
pub fn normalize_address(address: &str) -> String {
    let bare = address.split('@').next().unwrap_or(address);
    let bare = bare.split(':').next().unwrap_or(bare);
    bare.to_string()
}

// ============================================================================
// Helper wire protocol (JSON Lines over stdio)
// ============================================================================

/// Events the helper writes on stdout, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Qr {
        data: String,
    },
    Ready {
        identity: String,
    },
    Closed {
        reason: String,
    },
    Message {
        sender: String,
        text: String,
        message_id: String,
        timestamp: i64,
        #[serde(default)]
        from_me: bool,
    },
}

impl WireEvent {
    fn into_event(self) -> TransportEvent {
        match self {
            WireEvent::Qr { data } => TransportEvent::PairingRequired { challenge: data },
            WireEvent::Ready { identity } => TransportEvent::Established {
                identity: normalize_address(&identity),
            },
            WireEvent::Closed { reason } => TransportEvent::Closed {
                reason: classify_close_reason(&reason),
            },
            WireEvent::Message {
                sender,
                text,
                message_id,
                timestamp,
                from_me,
            } => TransportEvent::Message(InboundMessage {
                sender: normalize_address(&sender),
                text,
                message_id,
                timestamp,
                from_me,
            }),
        }
    }
}

/// Commands the bridge writes to the helper's stdin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireCommand {
    Connect { state_dir: String },
    Send { destination: String, text: String },
}

// ============================================================================
// Subprocess adapter
// ============================================================================

/// Transport implementation backed by the external helper process
pub struct SubprocessTransport {
    cmd: PathBuf,
    args: Vec<String>,
    state_dir: PathBuf,
    events: mpsc::Sender<TransportEvent>,
    /// Stdin writer of the current helper; replaced on every connect
    commands: Mutex<Option<mpsc::Sender<WireCommand>>>,
}

impl SubprocessTransport {
    /// Create the adapter plus the event stream the connection manager owns
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let transport = Self {
            cmd: config.transport_cmd.clone(),
            args: config.transport_args.clone(),
            state_dir: config.transport_state_dir.clone(),
            events: event_tx,
            commands: Mutex::new(None),
        };
        (transport, event_rx)
    }
}

#[async_trait::async_trait]
impl Transport for SubprocessTransport {
    async fn connect(&self) -> Result<()> {
        let mut command = Command::new(&self.cmd);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| Error::TransportInit(format!("spawn {}: {}", self.cmd.display(), e)))?;

        info!(helper = %self.cmd.display(), "Transport helper spawned");

        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
        cmd_tx
            .send(WireCommand::Connect {
                state_dir: self.state_dir.to_string_lossy().into_owned(),
            })
            .await
            .map_err(|_| Error::TransportInit("helper command channel closed".to_string()))?;

        // Dropping the previous sender ends the previous bridge task
        *self.commands.lock().await = Some(cmd_tx);

        tokio::spawn(run_bridge(child, cmd_rx, self.events.clone()));
        Ok(())
    }

    async fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        let sender = self.commands.lock().await.clone();
        let Some(tx) = sender else {
            return Err(Error::Transport(
                "transport helper is not running".to_string(),
            ));
        };

        tx.send(WireCommand::Send {
            destination: destination.to_string(),
            text: text.to_string(),
        })
        .await
        .map_err(|_| Error::Transport("transport helper command channel closed".to_string()))
    }
}

/// Bridge one helper process's stdio to the event/command channels.
///
/// Runs until the helper's stdout closes (the exit signal; EOF arrives only
/// after buffered events are drained) or the command channel is replaced by a
/// newer connect. If the helper never reported a close of its own, one is
/// synthesized so the connection manager applies its normal reconnect policy.
async fn run_bridge(
    mut child: Child,
    mut cmd_rx: mpsc::Receiver<WireCommand>,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut stdin = match child.stdin.take() {
        Some(stdin) => stdin,
        None => {
            error!("Transport helper spawned without piped stdin");
            return;
        }
    };
    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            error!("Transport helper spawned without piped stdout");
            return;
        }
    };
    let mut lines = BufReader::new(stdout).lines();
    let mut reported_close = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match serde_json::from_str::<WireEvent>(&line) {
                        Ok(wire) => {
                            if matches!(wire, WireEvent::Closed { .. }) {
                                reported_close = true;
                            }
                            if events.send(wire.into_event()).await.is_err() {
                                debug!("Event channel closed");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(line = %line, error = %e, "Unparseable transport helper line");
                        }
                    },
                    Ok(None) => {
                        debug!("Transport helper stdout closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Error reading transport helper stdout");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(command) => match serde_json::to_string(&command) {
                        Ok(json) => {
                            let line = format!("{}\n", json);
                            // A failed write means the helper is going down;
                            // the close still arrives through stdout EOF
                            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                                warn!(error = %e, "Failed to write to transport helper stdin");
                            } else if let Err(e) = stdin.flush().await {
                                warn!(error = %e, "Failed to flush transport helper stdin");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to serialize transport command");
                        }
                    },
                    None => {
                        debug!("Command channel closed, dropping helper");
                        break;
                    }
                }
            }
        }
    }

    let _ = child.kill().await;
    match child.wait().await {
        Ok(status) => info!(status = %status, "Transport helper exited"),
        Err(e) => error!(error = %e, "Error waiting for transport helper"),
    }

    if !reported_close {
        let _ = events
            .send(TransportEvent::Closed {
                reason: CloseReason::Other("transport helper exited".to_string()),
            })
            .await;
    }
}
