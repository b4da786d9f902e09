//! # Fact Providers
//!
//! External fact-check and news services consulted on a full cache miss. Each provider
//! returns its own [`ProviderPayload`] variant; the explicit mapping in
//! [`ProviderPayload::into_entry`] is the only place raw provider shapes are read.

pub mod brave;
pub mod gnews;
pub mod google;
pub mod serper;

use crate::{
    errors::CacheError,
    types::{FactCheckEntry, OriginProvider},
};
use async_trait::async_trait;
use chrono::Utc;
use dyn_clone::DynClone;
use reqwest::{Client as ReqwestClient, Response};
use serde::{de::DeserializeOwned, Deserialize};
use std::{fmt::Debug, time::Duration};
use tracing::info;

pub use brave::{BraveProvider, BraveSearchResponse};
pub use gnews::{GNewsProvider, GNewsResponse};
pub use google::{GoogleClaimsResponse, GoogleFactCheckProvider};
pub use serper::{SerperNewsResponse, SerperProvider};

/// Rating given to entries built from news coverage rather than a fact-check review.
pub const NEWS_COVERAGE_RATING: &str = "Unrated";

/// A provider's raw answer, one variant per provider.
#[derive(Debug, Clone)]
pub enum ProviderPayload {
    GoogleFactCheck(GoogleClaimsResponse),
    SerperNews(SerperNewsResponse),
    GNews(GNewsResponse),
    Brave(BraveSearchResponse),
}

impl ProviderPayload {
    /// Maps the payload into the canonical entry, keyed by `query`.
    ///
    /// `Ok(None)` means the provider answered but had nothing for this query.
    pub fn into_entry(self, query: &str) -> Result<Option<FactCheckEntry>, CacheError> {
        let entry = |claim_text: String,
                     claimant: String,
                     rating: String,
                     publisher: String,
                     date: String,
                     url: String,
                     origin: OriginProvider| FactCheckEntry {
            query: query.to_string(),
            claim_text,
            claimant,
            rating,
            publisher,
            date,
            url,
            origin_provider: origin,
            created_at: Utc::now(),
        };

        match self {
            ProviderPayload::GoogleFactCheck(resp) => {
                let Some(claim) = resp.claims.into_iter().next() else {
                    return Ok(None);
                };
                let review = claim.claim_review.into_iter().next().ok_or_else(|| {
                    CacheError::ProviderParse {
                        provider: "google".to_string(),
                        message: "claim has no review".to_string(),
                    }
                })?;
                Ok(Some(entry(
                    claim.text,
                    claim.claimant.unwrap_or_default(),
                    review.textual_rating,
                    review.publisher.name.unwrap_or_default(),
                    review.review_date.unwrap_or_default(),
                    review.url,
                    OriginProvider::Google,
                )))
            }
            ProviderPayload::SerperNews(resp) => Ok(resp.news.into_iter().next().map(|n| {
                entry(
                    n.title,
                    n.source.clone(),
                    NEWS_COVERAGE_RATING.to_string(),
                    n.source,
                    n.date,
                    n.link,
                    OriginProvider::Serper,
                )
            })),
            ProviderPayload::GNews(resp) => Ok(resp.articles.into_iter().next().map(|a| {
                entry(
                    a.title,
                    a.source.name.clone(),
                    NEWS_COVERAGE_RATING.to_string(),
                    a.source.name,
                    a.published_at,
                    a.url,
                    OriginProvider::GNews,
                )
            })),
            ProviderPayload::Brave(resp) => {
                let first = resp.web.and_then(|w| w.results.into_iter().next());
                Ok(first.map(|r| {
                    entry(
                        r.title,
                        String::new(),
                        NEWS_COVERAGE_RATING.to_string(),
                        "Web Search".to_string(),
                        String::new(),
                        r.url,
                        OriginProvider::Brave,
                    )
                }))
            }
        }
    }

    /// Short text snippets usable as context for the generative fallback.
    pub fn snippets(&self) -> Vec<String> {
        match self {
            ProviderPayload::GoogleFactCheck(resp) => resp
                .claims
                .iter()
                .flat_map(|c| {
                    c.claim_review
                        .iter()
                        .map(move |r| format!("{} (rated: {})", c.text, r.textual_rating))
                })
                .collect(),
            ProviderPayload::SerperNews(resp) => resp
                .news
                .iter()
                .map(|n| format!("{}: {} ({})", n.title, n.snippet, n.source))
                .collect(),
            ProviderPayload::GNews(resp) => resp
                .articles
                .iter()
                .map(|a| format!("{}: {} ({})", a.title, a.description, a.source.name))
                .collect(),
            ProviderPayload::Brave(resp) => resp
                .web
                .iter()
                .flat_map(|w| w.results.iter())
                .map(|r| format!("{}: {}", r.title, r.description))
                .collect(),
        }
    }
}

/// One member of the provider chain.
#[async_trait]
pub trait FactProvider: Send + Sync + Debug + DynClone {
    /// A short name for logs.
    fn name(&self) -> &str;

    /// Queries the provider. `Ok(None)` when it answered but found nothing.
    async fn query(&self, text: &str) -> Result<Option<ProviderPayload>, CacheError>;
}

dyn_clone::clone_trait_object!(FactProvider);

/// API key and optional base URL of one external service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactSourceConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides the service's public base URL (used for proxies and tests).
    #[serde(default)]
    pub base_url: Option<String>,
}

impl FactSourceConfig {
    /// The API key, if one is configured and non-blank.
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

/// Configuration of every external fact/news service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactSourcesConfig {
    #[serde(default)]
    pub google: FactSourceConfig,
    #[serde(default)]
    pub serper: FactSourceConfig,
    #[serde(default)]
    pub gnews: FactSourceConfig,
    #[serde(default)]
    pub brave: FactSourceConfig,
}

/// The configured providers: the authoritative one and the secondary ones, in order.
#[derive(Debug, Clone, Default)]
pub struct FactProviders {
    pub authoritative: Option<Box<dyn FactProvider>>,
    pub secondary: Vec<Box<dyn FactProvider>>,
}

/// Builds every provider that has an API key. Providers without one are skipped.
pub fn build_fact_providers(
    config: &FactSourcesConfig,
    timeout: Duration,
) -> Result<FactProviders, CacheError> {
    let client = build_client(timeout)?;
    let mut providers = FactProviders::default();

    match config.google.key() {
        Some(key) => {
            providers.authoritative = Some(Box::new(GoogleFactCheckProvider::new(
                client.clone(),
                key.to_string(),
                config.google.base_url_or(google::DEFAULT_BASE_URL),
            )))
        }
        None => info!(provider = "google", "No API key configured; provider skipped."),
    }
    match config.serper.key() {
        Some(key) => providers.secondary.push(Box::new(SerperProvider::new(
            client.clone(),
            key.to_string(),
            config.serper.base_url_or(serper::DEFAULT_BASE_URL),
        ))),
        None => info!(provider = "serper", "No API key configured; provider skipped."),
    }
    match config.gnews.key() {
        Some(key) => providers.secondary.push(Box::new(GNewsProvider::new(
            client.clone(),
            key.to_string(),
            config.gnews.base_url_or(gnews::DEFAULT_BASE_URL),
        ))),
        None => info!(provider = "gnews", "No API key configured; provider skipped."),
    }
    match config.brave.key() {
        Some(key) => providers.secondary.push(Box::new(BraveProvider::new(
            client,
            key.to_string(),
            config.brave.base_url_or(brave::DEFAULT_BASE_URL),
        ))),
        None => info!(provider = "brave", "No API key configured; provider skipped."),
    }
    Ok(providers)
}

pub(crate) fn build_client(timeout: Duration) -> Result<ReqwestClient, CacheError> {
    ReqwestClient::builder()
        .timeout(timeout)
        .build()
        .map_err(CacheError::ReqwestClientBuild)
}

/// Maps a transport failure to `Connectivity`.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> CacheError {
    CacheError::Connectivity(format!("{provider}: {err}"))
}

/// Checks the status and decodes the body, attributing failures to `provider`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &str,
    response: Response,
) -> Result<T, CacheError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;
    if !status.is_success() {
        return Err(CacheError::Connectivity(format!(
            "{provider} returned {status}: {body}"
        )));
    }
    serde_json::from_str(&body).map_err(|e| CacheError::ProviderParse {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}
