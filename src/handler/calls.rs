use crate::app::AppState;
use crate::error::CallError;
use crate::handler::middleware::Credential;
use crate::media::transcode::transcode_to_provider_wav;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::{general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info};

const STATUS_POLL_INTERVAL_MS: u64 = 100;
const STATUS_DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    pub credential: String,
    pub target_number: String,
    pub message_id: String,
    pub message_audio_base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallResponse {
    pub call_code: u32,
    pub bridge_number: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallStatusResponse {
    pub started: bool,
    pub completed: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ControlRequest {
    pub credential: String,
}

pub async fn create_call(
    State(state): State<AppState>,
    Json(request): Json<CreateCallRequest>,
) -> Response {
    let raw_audio = match STANDARD.decode(&request.message_audio_base64) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("rejecting call request with undecodable audio: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let audio = match transcode_to_provider_wav(&raw_audio) {
        Ok(audio) => audio,
        Err(e) => {
            error!("failed to transcode message audio: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state
        .registry
        .create(
            request.credential,
            request.target_number,
            request.message_id,
            audio,
        )
        .await
    {
        Ok(record) => {
            info!(code = record.call_code, "created call record");
            Json(CreateCallResponse {
                call_code: record.call_code,
                bridge_number: state.config.provider.source_number.clone(),
            })
            .into_response()
        }
        Err(CallError::MessageCollision(message_id)) => {
            error!(message_id, "call request collided with a live record");
            StatusCode::CONFLICT.into_response()
        }
        Err(CallError::CapacityExceeded) => {
            error!("call registry is full");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        Err(e) => {
            error!("failed to create call record: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Long-polls until the caller has been bridged (`started`), the record is
/// gone (`completed`), or the timeout lapses.
pub async fn call_status(
    _credential: Credential,
    State(state): State<AppState>,
    Path(call_code): Path<u32>,
    Query(params): Query<StatusParams>,
) -> Response {
    let timeout = Duration::from_millis(params.timeout.unwrap_or(STATUS_DEFAULT_TIMEOUT_MS));
    let deadline = Instant::now() + timeout;

    let mut record = state.registry.lookup(call_code).await;
    loop {
        match &record {
            None => break,
            Some(r) if r.source_number.is_some() => break,
            Some(_) => {}
        }
        if Instant::now() >= deadline {
            break;
        }
        sleep(Duration::from_millis(STATUS_POLL_INTERVAL_MS)).await;
        record = state.registry.lookup(call_code).await;
    }

    Json(CallStatusResponse {
        started: record
            .as_ref()
            .map(|r| r.source_number.is_some())
            .unwrap_or(false),
        completed: record.is_none(),
    })
    .into_response()
}

pub async fn speak(
    State(state): State<AppState>,
    Path(call_code): Path<u32>,
    Json(request): Json<ControlRequest>,
) -> Response {
    push_control(state, call_code, request.credential, "play").await
}

pub async fn stop(
    State(state): State<AppState>,
    Path(call_code): Path<u32>,
    Json(request): Json<ControlRequest>,
) -> Response {
    push_control(state, call_code, request.credential, "stop").await
}

async fn push_control(
    state: AppState,
    call_code: u32,
    credential: String,
    action: &str,
) -> Response {
    let record = match state.registry.lookup(call_code).await {
        Some(record) => record,
        None => return StatusCode::NO_CONTENT.into_response(),
    };
    if record.credential != credential {
        return StatusCode::NO_CONTENT.into_response();
    }

    let control_url = format!(
        "{}/webhooks/conference-update/{}/{}",
        state.config.public_origin, call_code, action
    );
    info!(call_code, action, "pushing audio control to bridge");
    match state.bridge.push_audio_control(call_code, &control_url).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(call_code, "failed to push audio control: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
