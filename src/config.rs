//! Configuration and deployment wiring
//!
//! Everything environment-specific lives here: the backend URL, the control
//! surface port, and the transport helper command. Timing policy constants
//! for the reconnect loop sit alongside so they have one home.

use std::path::{Path, PathBuf};

/// All configurable endpoints, paths, and tunables
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the companion backend (no trailing slash required)
    pub backend_url: String,
    /// Bind address for the control surface
    pub bind_addr: String,
    pub port: u16,
    /// Command that runs the external WhatsApp helper process
    pub transport_cmd: PathBuf,
    pub transport_args: Vec<String>,
    /// Directory the helper uses for its session credential store
    pub transport_state_dir: PathBuf,
    /// File of NOTIFY lines for the scheduled notifier
    pub notifications_file: PathBuf,
    pub relay_timeout_secs: u64,
    pub notify_check_interval_secs: u64,
}

impl Config {
    /// Build config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".companion-bridge");

        let backend_url =
            std::env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:8001".to_string());
        let port = std::env::var("BRIDGE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);
        let transport_cmd = std::env::var("TRANSPORT_CMD")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("wa-helper"));
        let transport_args = std::env::var("TRANSPORT_ARGS")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let transport_state_dir = std::env::var("TRANSPORT_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base.join("wa-session"));
        let notifications_file = std::env::var("NOTIFICATIONS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base.join("notifications.txt"));

        Self {
            backend_url,
            bind_addr: "0.0.0.0".to_string(),
            port,
            transport_cmd,
            transport_args,
            transport_state_dir,
            notifications_file,
            relay_timeout_secs: 30,
            notify_check_interval_secs: 60,
        }
    }

    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            backend_url: "http://127.0.0.1:1".to_string(),
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            transport_cmd: temp_dir.join("wa-helper"),
            transport_args: Vec::new(),
            transport_state_dir: temp_dir.join("wa-session"),
            notifications_file: temp_dir.join("notifications.txt"),
            relay_timeout_secs: 2,
            notify_check_interval_secs: 1,
        }
    }
}

/// Delay before retrying after an ordinary transport close
pub const RECONNECT_BASE_SECS: u64 = 5;

/// Delay after a pairing/query timeout close, so a human has time to scan
/// the next QR instead of the bridge hot-looping through challenges
pub const RECONNECT_PAIRING_SECS: u64 = 15;

/// Delay after the connect attempt itself failed
pub const RECONNECT_FAULT_SECS: u64 = 10;
