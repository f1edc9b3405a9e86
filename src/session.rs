//! Session record for the single connection to the messaging network
//!
//! The transition methods are the only way to mutate a `Session`, and each
//! one restores the field invariants: the pairing challenge/image pair exists
//! only while pairing, the account identity only while connected.

use serde::Serialize;

/// Lifecycle state of the bridge's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Pairing,
    Connected,
    Faulted,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Pairing => "pairing",
            ConnectionState::Connected => "connected",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Snapshot of the session for control-surface reads
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub state: ConnectionState,
    pub identity: Option<String>,
    pub qr_available: bool,
}

/// The single live (or attempting) connection record
#[derive(Debug)]
pub struct Session {
    state: ConnectionState,
    pairing_challenge: Option<String>,
    pairing_image: Option<String>,
    identity: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            pairing_challenge: None,
            pairing_image: None,
            identity: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn pairing_challenge(&self) -> Option<&str> {
        self.pairing_challenge.as_deref()
    }

    pub fn pairing_image(&self) -> Option<&str> {
        self.pairing_image.as_deref()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// A connect attempt is underway
    pub fn begin_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.pairing_challenge = None;
        self.pairing_image = None;
        self.identity = None;
    }

    /// The transport issued a pairing challenge; `image` is its rendered
    /// form, or None when rendering failed
    pub fn begin_pairing(&mut self, challenge: String, image: Option<String>) {
        self.state = ConnectionState::Pairing;
        self.pairing_challenge = Some(challenge);
        self.pairing_image = image;
        self.identity = None;
    }

    /// The transport established a session under `identity`
    pub fn establish(&mut self, identity: String) {
        self.state = ConnectionState::Connected;
        self.pairing_challenge = None;
        self.pairing_image = None;
        self.identity = Some(identity);
    }

    /// The transport closed; the session idles until the next connect attempt
    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.pairing_challenge = None;
        self.pairing_image = None;
        self.identity = None;
    }

    /// The connect attempt itself failed
    pub fn fault(&mut self) {
        self.state = ConnectionState::Faulted;
        self.pairing_challenge = None;
        self.pairing_image = None;
        self.identity = None;
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.state == ConnectionState::Connected,
            state: self.state,
            identity: self.identity.clone(),
            qr_available: self.pairing_image.is_some(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
