use super::{read_json, transport_error, FactProvider, ProviderPayload};
use crate::errors::CacheError;
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://gnews.io";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GNewsResponse {
    #[serde(default)]
    pub total_articles: u64,
    #[serde(default)]
    pub articles: Vec<GNewsArticle>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GNewsArticle {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub source: GNewsSource,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GNewsSource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// GNews article search, most relevant first.
#[derive(Clone, Debug)]
pub struct GNewsProvider {
    client: ReqwestClient,
    api_key: String,
    base_url: String,
}

impl GNewsProvider {
    pub fn new(client: ReqwestClient, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl FactProvider for GNewsProvider {
    fn name(&self) -> &str {
        "gnews"
    }

    async fn query(&self, text: &str) -> Result<Option<ProviderPayload>, CacheError> {
        debug!(provider = "gnews", query = %text, "--> Searching media archive");
        let response = self
            .client
            .get(format!("{}/api/v4/search", self.base_url))
            .query(&[
                ("q", text),
                ("token", self.api_key.as_str()),
                ("lang", "en"),
                ("max", "3"),
                ("sortby", "relevance"),
            ])
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        let payload: GNewsResponse = read_json(self.name(), response).await?;
        if payload.articles.is_empty() {
            return Ok(None);
        }
        Ok(Some(ProviderPayload::GNews(payload)))
    }
}
