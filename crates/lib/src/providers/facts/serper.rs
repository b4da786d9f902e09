use super::{read_json, transport_error, FactProvider, ProviderPayload};
use crate::errors::CacheError;
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://google.serper.dev";

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    gl: &'a str,
    hl: &'a str,
    num: u8,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SerperNewsResponse {
    #[serde(default)]
    pub news: Vec<SerperNewsItem>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SerperNewsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub date: String,
}

/// Serper's Google News search.
#[derive(Clone, Debug)]
pub struct SerperProvider {
    client: ReqwestClient,
    api_key: String,
    base_url: String,
}

impl SerperProvider {
    pub fn new(client: ReqwestClient, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl FactProvider for SerperProvider {
    fn name(&self) -> &str {
        "serper"
    }

    async fn query(&self, text: &str) -> Result<Option<ProviderPayload>, CacheError> {
        debug!(provider = "serper", query = %text, "--> Searching news");
        let response = self
            .client
            .post(format!("{}/news", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest {
                q: text,
                gl: "in",
                hl: "en",
                num: 5,
            })
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        let payload: SerperNewsResponse = read_json(self.name(), response).await?;
        if payload.news.is_empty() {
            return Ok(None);
        }
        Ok(Some(ProviderPayload::SerperNews(payload)))
    }
}
