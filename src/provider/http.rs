use super::{ConferenceInfo, ParticipantLeg, ProviderClient};
use crate::config::ProviderConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// REST client for the provider's account-scoped conference API. All
/// requests authenticate with basic auth (account sid / auth token).
pub struct HttpProviderClient {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct ParticipantPage {
    participants: Vec<ParticipantLeg>,
}

#[derive(Debug, Deserialize)]
struct CallResource {
    from: String,
}

impl HttpProviderClient {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
        }
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/Accounts/{}/{}",
            self.base_url, self.account_sid, path
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("provider GET {} returned {}", url, response.status()));
        }
        Ok(response.json::<T>().await?)
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        form: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "provider POST {} returned {}",
                url,
                response.status()
            ));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn fetch_conference(&self, conference_sid: &str) -> Result<ConferenceInfo> {
        self.get_json(self.account_url(&format!("Conferences/{}.json", conference_sid)))
            .await
    }

    async fn create_participant(
        &self,
        conference_sid: &str,
        from: &str,
        to: &str,
    ) -> Result<ParticipantLeg> {
        info!(conference_sid, to, "originating outbound conference leg");
        self.post_form(
            self.account_url(&format!("Conferences/{}/Participants.json", conference_sid)),
            &[("From", from), ("To", to), ("EndConferenceOnExit", "true")],
        )
        .await
    }

    async fn list_participants(&self, conference_sid: &str) -> Result<Vec<ParticipantLeg>> {
        let page: ParticipantPage = self
            .get_json(self.account_url(&format!(
                "Conferences/{}/Participants.json",
                conference_sid
            )))
            .await?;
        Ok(page.participants)
    }

    async fn update_participant_announce_url(
        &self,
        leg: &ParticipantLeg,
        announce_url: &str,
    ) -> Result<()> {
        let url = self.account_url(&format!(
            "Conferences/{}/Participants/{}.json",
            leg.conference_sid, leg.call_sid
        ));
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("AnnounceUrl", announce_url)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "provider announce update {} returned {}",
                url,
                response.status()
            ));
        }
        Ok(())
    }

    async fn fetch_call_origin(&self, call_sid: &str) -> Result<String> {
        let call: CallResource = self
            .get_json(self.account_url(&format!("Calls/{}.json", call_sid)))
            .await?;
        Ok(call.from)
    }
}
