use crate::app::AppState;
use crate::error::CallError;
use crate::markup::{self, ControlMarkup};
use crate::media::PROVIDER_AUDIO_MIME;
use crate::provider::signature::{verify_signature, SIGNATURE_HEADER};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

const EVENT_CONFERENCE_END: &str = "conference-end";
const EVENT_PARTICIPANT_JOIN: &str = "participant-join";

fn xml_response(control: ControlMarkup) -> Response {
    (
        [(header::CONTENT_TYPE, markup::CONTENT_TYPE)],
        control.to_xml(),
    )
        .into_response()
}

fn form_pairs(body: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect()
}

fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Checks the provider's request signature against the callback URL and
/// form parameters. Disabled when no auth token is configured.
fn verify_webhook(
    state: &AppState,
    path: &str,
    pairs: &[(String, String)],
    headers: &HeaderMap,
) -> Result<(), Response> {
    let url = format!("{}{}", state.config.public_origin, path);
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if !verify_signature(&state.config.provider.auth_token, &url, pairs, provided) {
        warn!(path, "webhook request failed signature validation");
        return Err(StatusCode::FORBIDDEN.into_response());
    }
    Ok(())
}

/// A human dialed the bridge number: prompt for the call code.
pub async fn initiate_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let pairs = form_pairs(&body);
    if let Err(denied) = verify_webhook(&state, "/webhooks/initiate-call", &pairs, &headers) {
        return denied;
    }

    info!(
        from = param(&pairs, "From").unwrap_or("-"),
        call_sid = param(&pairs, "CallSid").unwrap_or("-"),
        "inbound call received"
    );
    xml_response(ControlMarkup::Prompt {
        action_url: format!("{}/webhooks/confirm-code", state.config.public_origin),
    })
}

/// The caller keyed in digits: join them into the conference for their
/// code, or apologize and hang up.
pub async fn confirm_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let pairs = form_pairs(&body);
    if let Err(denied) = verify_webhook(&state, "/webhooks/confirm-code", &pairs, &headers) {
        return denied;
    }

    let digits = param(&pairs, "Digits").unwrap_or_default();
    info!(
        from = param(&pairs, "From").unwrap_or("-"),
        digits, "confirmation code received"
    );

    let record = match digits.trim().parse::<u32>() {
        Ok(code) => state.registry.lookup(code).await,
        Err(_) => None,
    };
    match record {
        Some(record) => xml_response(ControlMarkup::JoinConference {
            status_callback_url: format!(
                "{}/webhooks/conference-status/{}",
                state.config.public_origin, record.call_code
            ),
            call_code: record.call_code,
        }),
        None => xml_response(ControlMarkup::Hangup),
    }
}

/// Conference lifecycle events. The first join bridges in the target; the
/// end event destroys the record. Everything else is a duplicate or
/// out-of-order delivery and is acknowledged without action.
pub async fn conference_status(
    State(state): State<AppState>,
    Path(call_code): Path<u32>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let pairs = form_pairs(&body);
    let path = format!("/webhooks/conference-status/{}", call_code);
    if let Err(denied) = verify_webhook(&state, &path, &pairs, &headers) {
        return denied;
    }

    let event = param(&pairs, "StatusCallbackEvent").unwrap_or_default();
    info!(call_code, event, "conference status update");

    if event == EVENT_CONFERENCE_END {
        state.registry.destroy(call_code).await;
        return StatusCode::NO_CONTENT.into_response();
    }

    if event != EVENT_PARTICIPANT_JOIN || param(&pairs, "SequenceNumber") != Some("1") {
        return StatusCode::NO_CONTENT.into_response();
    }

    let conference_sid = param(&pairs, "ConferenceSid").unwrap_or_default();
    match state
        .bridge
        .connect_conference_to_target(conference_sid, call_code)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ (CallError::CodeMismatch { .. } | CallError::RecordNotFound(_))) => {
            error!(call_code, conference_sid, "refusing to bridge: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!(call_code, conference_sid, "bridge failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Mid-call control fetch, play flavor: a leg asks what to do next after
/// `push_audio_control` redirected it here.
pub async fn conference_update_play(
    State(state): State<AppState>,
    Path(call_code): Path<u32>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let pairs = form_pairs(&body);
    let path = format!("/webhooks/conference-update/{}/play", call_code);
    if let Err(denied) = verify_webhook(&state, &path, &pairs, &headers) {
        return denied;
    }

    match state.registry.lookup(call_code).await {
        Some(_) => xml_response(ControlMarkup::PlayAudio {
            audio_url: format!(
                "{}/webhooks/audio-file/{}",
                state.config.public_origin, call_code
            ),
        }),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub async fn conference_update_stop(
    State(state): State<AppState>,
    Path(call_code): Path<u32>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let pairs = form_pairs(&body);
    let path = format!("/webhooks/conference-update/{}/stop", call_code);
    if let Err(denied) = verify_webhook(&state, &path, &pairs, &headers) {
        return denied;
    }

    match state.registry.lookup(call_code).await {
        Some(_) => xml_response(ControlMarkup::Silence),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Streams the stored message audio to the provider's media fetcher.
pub async fn audio_file(
    State(state): State<AppState>,
    Path(call_code): Path<u32>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/webhooks/audio-file/{}", call_code);
    if let Err(denied) = verify_webhook(&state, &path, &[], &headers) {
        return denied;
    }

    match state.registry.lookup(call_code).await {
        Some(record) => (
            [(header::CONTENT_TYPE, PROVIDER_AUDIO_MIME)],
            record.message_audio,
        )
            .into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
