use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::{
    app_state::AppState,
    camera::discovery::ProbeReport,
    core::{errors::AppError, state::ScannerStatus, status::StatusMessage},
    scan::{gate::Decision, pipeline::SaveReceipt},
};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct StatusResponse {
    app_name: String,
    #[serde(flatten)]
    scanner: ScannerStatus,
    message: Option<StatusMessage>,
}

#[derive(Debug, Serialize)]
pub struct FocusResponse {
    applied: bool,
}

#[derive(Deserialize)]
pub struct DecodeRequest {
    text: String,
}

#[derive(Serialize)]
pub struct DecodeResponse {
    decision: Option<Decision>,
}

/// Quantity arrives either as the raw input text or as a JSON number.
#[derive(Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    quantity: Value,
}

impl ConfirmRequest {
    fn quantity_text(&self) -> String {
        match &self.quantity {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Serialize)]
pub struct CancelResponse {
    dismissed: Option<String>,
}

#[derive(Serialize)]
pub struct PingResponse {
    ok: bool,
    message: Option<String>,
}

pub async fn root() -> Redirect {
    Redirect::to("/static/index.html")
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let scanner = state.scanner.status().await;
    let message = state.scanner.status_board().visible().await;
    Json(StatusResponse {
        app_name: state.config.app_name.clone(),
        scanner,
        message,
    })
}

pub async fn cameras(State(state): State<Arc<AppState>>) -> Json<ProbeReport> {
    Json(state.scanner.camera_report().await)
}

pub async fn scanner_start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScannerStatus>, AppError> {
    info!("scanner start requested");
    let status = state.scanner.start_scanning().await?;
    Ok(Json(status))
}

pub async fn scanner_stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScannerStatus>, AppError> {
    info!("scanner stop requested");
    let status = state.scanner.stop_scanning().await?;
    Ok(Json(status))
}

pub async fn scanner_focus(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FocusResponse>, AppError> {
    let applied = state
        .scanner
        .force_focus()
        .await
        .map_err(|err| AppError::new(StatusCode::CONFLICT, format!("{err:#}")))?;
    Ok(Json(FocusResponse { applied }))
}

pub async fn decode(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DecodeRequest>,
) -> Json<DecodeResponse> {
    let decision = state.scanner.handle_decode(&payload.text).await;
    Json(DecodeResponse { decision })
}

pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<Json<SaveReceipt>, AppError> {
    let receipt = state.scanner.confirm(&payload.quantity_text()).await?;
    Ok(Json(receipt))
}

pub async fn cancel(State(state): State<Arc<AppState>>) -> Result<Json<CancelResponse>, AppError> {
    let dismissed = state.scanner.dismiss().await?;
    Ok(Json(CancelResponse { dismissed }))
}

pub async fn ping(State(state): State<Arc<AppState>>) -> (StatusCode, Json<PingResponse>) {
    let ok = state.scanner.test_connection().await;
    let message = state
        .scanner
        .status_board()
        .visible()
        .await
        .map(|status| status.message);
    let code = if ok {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (code, Json(PingResponse { ok, message }))
}
