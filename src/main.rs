//! Companion Bridge daemon
//!
//! CLI for running the WhatsApp relay bridge and for poking a running
//! instance through its control surface.

use clap::{Parser, Subcommand};
use companion_bridge::config::Config;
use companion_bridge::connection::{self, ConnectionHandle};
use companion_bridge::relay::MessageRelay;
use companion_bridge::transport::{SubprocessTransport, Transport};
use companion_bridge::{schedule, server};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONTROL_URL: &str = "http://127.0.0.1:3001";

/// Companion Bridge - WhatsApp relay daemon
#[derive(Parser)]
#[command(name = "companion-bridge")]
#[command(about = "Bridge between the WhatsApp transport and the companion backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge in the foreground
    Serve,

    /// Show connection status of a running bridge
    Status {
        /// Control surface base URL
        #[arg(long, default_value = DEFAULT_CONTROL_URL)]
        url: String,
    },

    /// Print the current pairing challenge of a running bridge
    Qr {
        /// Control surface base URL
        #[arg(long, default_value = DEFAULT_CONTROL_URL)]
        url: String,
    },

    /// Send a message through a running bridge
    Send {
        /// Destination phone number
        destination: String,

        /// Message text
        text: String,

        /// Control surface base URL
        #[arg(long, default_value = DEFAULT_CONTROL_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => cmd_serve().await,
        Commands::Status { url } => cmd_status(&url).await,
        Commands::Qr { url } => cmd_qr(&url).await,
        Commands::Send {
            destination,
            text,
            url,
        } => cmd_send(&url, &destination, &text).await,
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

async fn cmd_serve() -> anyhow::Result<()> {
    let config = Config::from_env();
    info!(
        backend = %config.backend_url,
        port = config.port,
        helper = %config.transport_cmd.display(),
        "Companion bridge starting"
    );

    let (transport, events) = SubprocessTransport::new(&config);
    let transport: Arc<dyn Transport> = Arc::new(transport);
    let connection = ConnectionHandle::new(transport);

    let relay = Arc::new(MessageRelay::new(&config, connection.clone())?);
    connection::spawn(connection.clone(), events, relay);

    tokio::spawn(schedule::run(
        connection.clone(),
        config.notifications_file.clone(),
        Duration::from_secs(config.notify_check_interval_secs),
    ));

    let addr = format!("{}:{}", config.bind_addr, config.port);
    server::run(connection, &addr).await?;
    Ok(())
}

async fn cmd_status(url: &str) -> anyhow::Result<()> {
    let body: serde_json::Value = reqwest::get(format!("{}/status", url)).await?.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn cmd_qr(url: &str) -> anyhow::Result<()> {
    let body: serde_json::Value = reqwest::get(format!("{}/qr", url)).await?.json().await?;

    match body.get("qr_raw").and_then(|v| v.as_str()) {
        Some(raw) => {
            println!("Pairing challenge (scan from the phone's linked-devices screen):");
            println!("{}", raw);
        }
        None => {
            let state = body
                .get("connection_state")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            println!("No pairing challenge outstanding (state: {})", state);
        }
    }
    Ok(())
}

async fn cmd_send(url: &str, destination: &str, text: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .post(format!("{}/send", url))
        .json(&serde_json::json!({ "phone_number": destination, "message": text }))
        .send()
        .await?
        .json()
        .await?;

    if body
        .get("success")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        println!("Sent to {}", destination);
        Ok(())
    } else {
        let error = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("send failed: {}", error);
    }
}
