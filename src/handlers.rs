//! Control surface handlers
//!
//! Stateless JSON handlers over the connection handle. Reads never fail;
//! the two send entry points surface validation errors as 400 and transport
//! errors as 500, always with a `{success, error}` body.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::notify::{format_notification, NotificationCategory};
use crate::server::AppState;
use crate::session::ConnectionState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connection: ConnectionState,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.connection.status().await;
    Json(HealthResponse {
        status: "ok",
        connection: status.state,
    })
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub qr: Option<String>,
    pub qr_raw: Option<String>,
    pub connection_state: ConnectionState,
}

pub async fn qr(State(state): State<AppState>) -> Json<QrResponse> {
    let (qr, qr_raw) = state.connection.pairing().await;
    let status = state.connection.status().await;
    Json(QrResponse {
        qr,
        qr_raw,
        connection_state: status.state,
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub connection_state: ConnectionState,
    pub identity: Option<String>,
    pub qr_available: bool,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.connection.status().await;
    Json(StatusResponse {
        connected: status.connected,
        connection_state: status.state,
        identity: status.identity,
        qr_available: status.qr_available,
    })
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResponse {
    fn ok() -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                error: None,
            }),
        )
    }

    fn bad_request(error: &str) -> (StatusCode, Json<Self>) {
        (
            StatusCode::BAD_REQUEST,
            Json(Self {
                success: false,
                error: Some(error.to_string()),
            }),
        )
    }

    fn failed(error: String) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self {
                success: false,
                error: Some(error),
            }),
        )
    }
}

pub async fn send(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> (StatusCode, Json<SendResponse>) {
    if request.phone_number.trim().is_empty() || request.message.trim().is_empty() {
        return SendResponse::bad_request("phone_number and message are required");
    }

    match state
        .connection
        .send(&request.phone_number, &request.message)
        .await
    {
        Ok(()) => {
            info!(destination = %request.phone_number, "Direct send dispatched");
            SendResponse::ok()
        }
        Err(e) => SendResponse::failed(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub category: Option<String>,
}

pub async fn schedule(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> (StatusCode, Json<SendResponse>) {
    if request.phone_number.trim().is_empty() || request.message.trim().is_empty() {
        return SendResponse::bad_request("phone_number and message are required");
    }

    let category = request
        .category
        .as_deref()
        .map(NotificationCategory::parse)
        .unwrap_or(NotificationCategory::Reminder);
    let text = format_notification(category, &request.message);

    match state.connection.send(&request.phone_number, &text).await {
        Ok(()) => {
            info!(
                destination = %request.phone_number,
                category = %category,
                "Scheduled send dispatched"
            );
            SendResponse::ok()
        }
        Err(e) => SendResponse::failed(e.to_string()),
    }
}
