use super::{read_json, transport_error, FactProvider, ProviderPayload};
use crate::errors::CacheError;
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.search.brave.com";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct BraveSearchResponse {
    #[serde(default)]
    pub web: Option<BraveWebResults>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct BraveWebResults {
    #[serde(default)]
    pub results: Vec<BraveWebResult>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BraveWebResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}

/// Brave web search.
#[derive(Clone, Debug)]
pub struct BraveProvider {
    client: ReqwestClient,
    api_key: String,
    base_url: String,
}

impl BraveProvider {
    pub fn new(client: ReqwestClient, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl FactProvider for BraveProvider {
    fn name(&self) -> &str {
        "brave"
    }

    async fn query(&self, text: &str) -> Result<Option<ProviderPayload>, CacheError> {
        debug!(provider = "brave", query = %text, "--> Searching the web");
        let response = self
            .client
            .get(format!("{}/res/v1/web/search", self.base_url))
            .query(&[("q", text), ("count", "3")])
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        let payload: BraveSearchResponse = read_json(self.name(), response).await?;
        let empty = payload
            .web
            .as_ref()
            .map(|w| w.results.is_empty())
            .unwrap_or(true);
        if empty {
            return Ok(None);
        }
        Ok(Some(ProviderPayload::Brave(payload)))
    }
}
