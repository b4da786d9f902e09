use super::{read_json, transport_error, FactProvider, ProviderPayload};
use crate::errors::CacheError;
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://factchecktools.googleapis.com";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GoogleClaimsResponse {
    #[serde(default)]
    pub claims: Vec<GoogleClaim>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GoogleClaim {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub claimant: Option<String>,
    #[serde(default)]
    pub claim_review: Vec<GoogleClaimReview>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GoogleClaimReview {
    #[serde(default)]
    pub publisher: GooglePublisher,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub textual_rating: String,
    #[serde(default)]
    pub review_date: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GooglePublisher {
    #[serde(default)]
    pub name: Option<String>,
}

/// The authoritative provider: Google Fact Check Tools `claims:search`.
#[derive(Clone, Debug)]
pub struct GoogleFactCheckProvider {
    client: ReqwestClient,
    api_key: String,
    base_url: String,
}

impl GoogleFactCheckProvider {
    pub fn new(client: ReqwestClient, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl FactProvider for GoogleFactCheckProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn query(&self, text: &str) -> Result<Option<ProviderPayload>, CacheError> {
        let url = format!("{}/v1alpha1/claims:search", self.base_url);
        debug!(provider = "google", query = %text, "--> Searching fact checks");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("query", text),
                ("languageCode", "en-US"),
            ])
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        let payload: GoogleClaimsResponse = read_json(self.name(), response).await?;
        if payload.claims.is_empty() {
            return Ok(None);
        }
        Ok(Some(ProviderPayload::GoogleFactCheck(payload)))
    }
}
