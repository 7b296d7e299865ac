use crate::app::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub mod calls;
pub mod middleware;
pub mod webhooks;
#[cfg(test)]
mod tests;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/calls", post(calls::create_call))
        .route("/calls/{call_code}/status", get(calls::call_status))
        .route("/calls/{call_code}/speak", post(calls::speak))
        .route("/calls/{call_code}/stop", post(calls::stop))
        .route("/webhooks/initiate-call", post(webhooks::initiate_call))
        .route("/webhooks/confirm-code", post(webhooks::confirm_code))
        .route(
            "/webhooks/conference-status/{call_code}",
            post(webhooks::conference_status),
        )
        .route(
            "/webhooks/conference-update/{call_code}/play",
            post(webhooks::conference_update_play),
        )
        .route(
            "/webhooks/conference-update/{call_code}/stop",
            post(webhooks::conference_update_stop),
        )
        .route("/webhooks/audio-file/{call_code}", get(webhooks::audio_file))
}
