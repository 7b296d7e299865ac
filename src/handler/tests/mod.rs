use crate::app::{AppState, AppStateBuilder};
use crate::config::Config;
use crate::handler::calls::{
    self, CallStatusResponse, ControlRequest, CreateCallRequest, CreateCallResponse, StatusParams,
};
use crate::handler::middleware::Credential;
use crate::handler::webhooks;
use crate::markup;
use crate::provider::{ConferenceInfo, ParticipantLeg, ProviderClient};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use base64::engine::{general_purpose::STANDARD, Engine};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Provider stand-in for driving the webhook flow end to end: one inbound
/// caller already waiting in conference CF1.
struct FakeProvider {
    conference_code: Mutex<Option<u32>>,
    announce_urls: Mutex<Vec<(String, String)>>,
    outbound_targets: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            conference_code: Mutex::new(None),
            announce_urls: Mutex::new(Vec::new()),
            outbound_targets: Mutex::new(Vec::new()),
        })
    }

    fn set_code(&self, code: u32) {
        *self.conference_code.lock().unwrap() = Some(code);
    }

    fn announce_urls(&self) -> Vec<(String, String)> {
        self.announce_urls.lock().unwrap().clone()
    }

    fn outbound_targets(&self) -> Vec<String> {
        self.outbound_targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn fetch_conference(&self, conference_sid: &str) -> Result<ConferenceInfo> {
        let code = self
            .conference_code
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow::anyhow!("no conference live"))?;
        Ok(ConferenceInfo {
            sid: conference_sid.to_string(),
            friendly_name: markup::conference_name(code),
        })
    }

    async fn create_participant(
        &self,
        conference_sid: &str,
        _from: &str,
        to: &str,
    ) -> Result<ParticipantLeg> {
        self.outbound_targets.lock().unwrap().push(to.to_string());
        Ok(ParticipantLeg {
            conference_sid: conference_sid.to_string(),
            call_sid: "CA-out".to_string(),
        })
    }

    async fn list_participants(&self, conference_sid: &str) -> Result<Vec<ParticipantLeg>> {
        Ok(vec![
            ParticipantLeg {
                conference_sid: conference_sid.to_string(),
                call_sid: "CA-in".to_string(),
            },
            ParticipantLeg {
                conference_sid: conference_sid.to_string(),
                call_sid: "CA-out".to_string(),
            },
        ])
    }

    async fn update_participant_announce_url(
        &self,
        leg: &ParticipantLeg,
        announce_url: &str,
    ) -> Result<()> {
        self.announce_urls
            .lock()
            .unwrap()
            .push((leg.call_sid.clone(), announce_url.to_string()));
        Ok(())
    }

    async fn fetch_call_origin(&self, call_sid: &str) -> Result<String> {
        if call_sid == "CA-in" {
            Ok("+15552223333".to_string())
        } else {
            Err(anyhow::anyhow!("unknown call {}", call_sid))
        }
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.public_origin = "http://localhost:8080".to_string();
    config.provider.source_number = "+15550009999".to_string();
    // Empty auth token disables webhook signature validation.
    config.provider.auth_token = String::new();
    config
}

fn test_state(provider: Arc<FakeProvider>) -> AppState {
    AppStateBuilder::new()
        .config(test_config())
        .provider(provider)
        .build()
        .unwrap()
}

fn wav_base64() -> String {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..800i32 {
            writer.write_sample((i % 128) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    STANDARD.encode(cursor.into_inner())
}

async fn response_to_bytes(response: Response) -> Vec<u8> {
    let body = response.into_body();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    bytes.to_vec()
}

async fn response_to_string(response: Response) -> String {
    String::from_utf8(response_to_bytes(response).await).unwrap()
}

async fn create_test_call(state: &AppState) -> CreateCallResponse {
    let response = calls::create_call(
        State(state.clone()),
        Json(CreateCallRequest {
            credential: "cred".to_string(),
            target_number: "+15550001111".to_string(),
            message_id: "m1".to_string(),
            message_audio_base64: wav_base64(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&response_to_bytes(response).await).unwrap()
}

async fn fetch_status(state: &AppState, code: u32, timeout_ms: u64) -> CallStatusResponse {
    let response = calls::call_status(
        Credential("cred".to_string()),
        State(state.clone()),
        Path(code),
        Query(StatusParams {
            timeout: Some(timeout_ms),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&response_to_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_full_bridge_flow() {
    let provider = FakeProvider::new();
    let state = test_state(provider.clone());

    // Phase 1: the app trades credential + target + message for a code.
    let created = create_test_call(&state).await;
    assert!((10000..=99999).contains(&created.call_code));
    assert_eq!(created.bridge_number, "+15550009999");
    let code = created.call_code;

    let status = fetch_status(&state, code, 10).await;
    assert!(!status.started);
    assert!(!status.completed);

    // Phase 2/3: the human dials in and is prompted for the code.
    let response = webhooks::initiate_call(
        State(state.clone()),
        HeaderMap::new(),
        "From=%2B15552223333&CallSid=CA-in".to_string(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let xml = response_to_string(response).await;
    assert!(xml.contains("<Gather"));
    assert!(xml.contains("/webhooks/confirm-code"));

    let response = webhooks::confirm_code(
        State(state.clone()),
        HeaderMap::new(),
        format!("From=%2B15552223333&Digits={}", code),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let xml = response_to_string(response).await;
    assert!(xml.contains(&format!(">call-{}</Conference>", code)));

    // Phase 4: first join event bridges the target in.
    provider.set_code(code);
    let response = webhooks::conference_status(
        State(state.clone()),
        Path(code),
        HeaderMap::new(),
        "StatusCallbackEvent=participant-join&SequenceNumber=1&ConferenceSid=CF1".to_string(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(provider.outbound_targets(), vec!["+15550001111".to_string()]);

    let status = fetch_status(&state, code, 10).await;
    assert!(status.started);
    assert!(!status.completed);

    // A duplicate join delivery is acknowledged without a second bridge.
    let response = webhooks::conference_status(
        State(state.clone()),
        Path(code),
        HeaderMap::new(),
        "StatusCallbackEvent=participant-join&SequenceNumber=2&ConferenceSid=CF1".to_string(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(provider.outbound_targets().len(), 1);

    // Phase 5/6: play, then stop.
    let response = calls::speak(
        State(state.clone()),
        Path(code),
        Json(ControlRequest {
            credential: "cred".to_string(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let pushes = provider.announce_urls();
    assert_eq!(pushes.len(), 2);
    assert!(pushes.iter().all(|(_, url)| url.ends_with(&format!(
        "/webhooks/conference-update/{}/play",
        code
    ))));

    let response = webhooks::conference_update_play(
        State(state.clone()),
        Path(code),
        HeaderMap::new(),
        String::new(),
    )
    .await;
    let xml = response_to_string(response).await;
    assert!(xml.contains(&format!("/webhooks/audio-file/{}", code)));

    let response =
        webhooks::audio_file(State(state.clone()), Path(code), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .unwrap(),
        "audio/wav"
    );
    let audio = response_to_bytes(response).await;
    assert!(audio.starts_with(b"RIFF"));

    let response = calls::stop(
        State(state.clone()),
        Path(code),
        Json(ControlRequest {
            credential: "cred".to_string(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(provider
        .announce_urls()
        .last()
        .unwrap()
        .1
        .ends_with(&format!("/webhooks/conference-update/{}/stop", code)));

    // Conference end destroys the record.
    let response = webhooks::conference_status(
        State(state.clone()),
        Path(code),
        HeaderMap::new(),
        "StatusCallbackEvent=conference-end&ConferenceSid=CF1".to_string(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let status = fetch_status(&state, code, 10).await;
    assert!(status.completed);
    assert!(state.registry.lookup(code).await.is_none());
}

#[tokio::test]
async fn test_unknown_code_hangs_up_without_error_status() {
    let state = test_state(FakeProvider::new());
    let response = webhooks::confirm_code(
        State(state.clone()),
        HeaderMap::new(),
        "From=%2B15552223333&Digits=99999".to_string(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let xml = response_to_string(response).await;
    assert!(xml.contains("<Hangup/>"));

    // Non-numeric digits get the same terminal treatment.
    let response = webhooks::confirm_code(
        State(state.clone()),
        HeaderMap::new(),
        "Digits=abcde".to_string(),
    )
    .await;
    assert!(response_to_string(response).await.contains("<Hangup/>"));
}

#[tokio::test]
async fn test_speak_noops_on_missing_record_or_bad_credential() {
    let provider = FakeProvider::new();
    let state = test_state(provider.clone());

    let response = calls::speak(
        State(state.clone()),
        Path(12345),
        Json(ControlRequest {
            credential: "cred".to_string(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let created = create_test_call(&state).await;
    let response = calls::speak(
        State(state.clone()),
        Path(created.call_code),
        Json(ControlRequest {
            credential: "someone-else".to_string(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(provider.announce_urls().is_empty());
}

#[tokio::test]
async fn test_speak_before_bridge_is_a_server_error() {
    let state = test_state(FakeProvider::new());
    let created = create_test_call(&state).await;

    let response = calls::speak(
        State(state.clone()),
        Path(created.call_code),
        Json(ControlRequest {
            credential: "cred".to_string(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_message_collision_maps_to_conflict() {
    let state = test_state(FakeProvider::new());
    create_test_call(&state).await;

    let response = calls::create_call(
        State(state.clone()),
        Json(CreateCallRequest {
            credential: "someone-else".to_string(),
            target_number: "+15550001111".to_string(),
            message_id: "m1".to_string(),
            message_audio_base64: wav_base64(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_mid_call_fetch_for_dead_record_fails_terminally() {
    let state = test_state(FakeProvider::new());

    let response = webhooks::conference_update_play(
        State(state.clone()),
        Path(12345),
        HeaderMap::new(),
        String::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response =
        webhooks::audio_file(State(state.clone()), Path(12345), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_webhook_signature_is_enforced_when_configured() {
    let provider = FakeProvider::new();
    let mut config = test_config();
    config.provider.auth_token = "secret".to_string();
    let state = AppStateBuilder::new()
        .config(config)
        .provider(provider)
        .build()
        .unwrap();

    let body = "From=%2B15552223333&CallSid=CA-in".to_string();
    let response =
        webhooks::initiate_call(State(state.clone()), HeaderMap::new(), body.clone()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let params = vec![
        ("From".to_string(), "+15552223333".to_string()),
        ("CallSid".to_string(), "CA-in".to_string()),
    ];
    let signature = crate::provider::signature::compute_signature(
        "secret",
        "http://localhost:8080/webhooks/initiate-call",
        &params,
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        crate::provider::signature::SIGNATURE_HEADER,
        signature.parse().unwrap(),
    );
    let response = webhooks::initiate_call(State(state.clone()), headers, body).await;
    assert_eq!(response.status(), StatusCode::OK);
}
