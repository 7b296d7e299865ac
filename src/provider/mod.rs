use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

pub mod http;
pub mod signature;

pub use self::http::HttpProviderClient;

/// One endpoint's connection within a provider conference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParticipantLeg {
    pub conference_sid: String,
    pub call_sid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConferenceInfo {
    pub sid: String,
    pub friendly_name: String,
}

/// The telephony provider, reduced to the five operations the bridge needs.
/// The bridge controller only ever talks to this trait, so tests run against
/// a mock instead of a real telephony backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn fetch_conference(&self, conference_sid: &str) -> Result<ConferenceInfo>;

    /// Originates an outbound leg into the conference. The provider tears
    /// the whole conference down when this leg exits.
    async fn create_participant(
        &self,
        conference_sid: &str,
        from: &str,
        to: &str,
    ) -> Result<ParticipantLeg>;

    async fn list_participants(&self, conference_sid: &str) -> Result<Vec<ParticipantLeg>>;

    /// Points one leg at fresh control markup mid-call.
    async fn update_participant_announce_url(
        &self,
        leg: &ParticipantLeg,
        announce_url: &str,
    ) -> Result<()>;

    /// The origin number of an existing call leg.
    async fn fetch_call_origin(&self, call_sid: &str) -> Result<String>;
}
