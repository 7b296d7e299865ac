use crate::error::CallError;
use crate::markup::parse_conference_code;
use crate::provider::ProviderClient;
use crate::registry::CallRegistry;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Drives the provider-side conference lifecycle for a bridged call: adds
/// the outbound target leg once the human caller has joined, and pushes
/// mid-call audio-control instructions to every known leg.
pub struct BridgeController {
    registry: Arc<CallRegistry>,
    provider: Arc<dyn ProviderClient>,
    source_number: String,
    target_number_override: Option<String>,
}

impl BridgeController {
    pub fn new(
        registry: Arc<CallRegistry>,
        provider: Arc<dyn ProviderClient>,
        source_number: String,
        target_number_override: Option<String>,
    ) -> Self {
        Self {
            registry,
            provider,
            source_number,
            target_number_override,
        }
    }

    /// Joins the record's target number into the conference the human
    /// caller just entered, then records both legs and the caller's origin
    /// number. The record can be evicted or ended while a provider call is
    /// in flight; that surfaces as `RecordNotFound`.
    pub async fn connect_conference_to_target(
        &self,
        conference_sid: &str,
        call_code: u32,
    ) -> Result<(), CallError> {
        let conference = self.provider.fetch_conference(conference_sid).await?;
        let found = parse_conference_code(&conference.friendly_name).ok_or_else(|| {
            CallError::Provider(anyhow::anyhow!(
                "conference {} has unparseable name {}",
                conference_sid,
                conference.friendly_name
            ))
        })?;
        if found != call_code {
            return Err(CallError::CodeMismatch {
                expected: call_code,
                found,
            });
        }

        let record = self
            .registry
            .lookup(call_code)
            .await
            .ok_or(CallError::RecordNotFound(call_code))?;

        let target = self
            .target_number_override
            .as_deref()
            .unwrap_or(&record.target_number);
        let outbound = self
            .provider
            .create_participant(conference_sid, &self.source_number, target)
            .await?;

        // The listing can lag the participant we just created.
        let mut legs = self.provider.list_participants(conference_sid).await?;
        if !legs.iter().any(|leg| leg.call_sid == outbound.call_sid) {
            legs.push(outbound.clone());
        }

        let inbound = legs
            .iter()
            .find(|leg| leg.call_sid != outbound.call_sid)
            .cloned();
        self.registry.set_provider_legs(call_code, legs).await?;

        match inbound {
            Some(leg) => {
                let origin = self.provider.fetch_call_origin(&leg.call_sid).await?;
                info!(call_code, "bridged caller resolved");
                self.registry.set_source_number(call_code, origin).await?;
            }
            None => {
                warn!(call_code, conference_sid, "no inbound leg in conference");
            }
        }
        Ok(())
    }

    /// Redirects every leg of the bridge to fetch fresh control markup.
    /// Whether that plays the message or silences it is decided entirely by
    /// which endpoint `control_url` names.
    pub async fn push_audio_control(
        &self,
        call_code: u32,
        control_url: &str,
    ) -> Result<(), CallError> {
        let record = self
            .registry
            .lookup(call_code)
            .await
            .ok_or(CallError::RecordNotFound(call_code))?;
        let legs = record
            .provider_legs
            .ok_or(CallError::NoActiveBridge(call_code))?;

        try_join_all(legs.iter().map(|leg| {
            self.provider
                .update_participant_announce_url(leg, control_url)
        }))
        .await?;
        Ok(())
    }

    pub async fn is_in_progress(&self) -> bool {
        self.registry.has_live_calls().await
    }
}
