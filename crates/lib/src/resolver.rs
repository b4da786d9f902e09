//! # Provider Chain Resolver
//!
//! Consulted only on a full cache miss. Tries the authoritative fact-check provider,
//! then the secondary news providers in parallel, then the generative fallback. Any
//! provider failure is logged and the chain moves on; exhausting the chain is `None`.
//!
//! A resolved entry is written to the Embedded Store, then to the Durable Store under
//! the pool timeout. Both writes are reported as side writes and never fail the call.

use crate::{
    errors::CacheError,
    keys::normalize_query,
    prompts::render,
    providers::{
        ai::{extract_json_object, AiProvider},
        db::{durable::DurablePool, sqlite::EmbeddedStore},
        facts::{FactProvider, FactProviders, ProviderPayload},
    },
    types::{FactCheckEntry, OriginProvider, Outcome, SideWrite, StoreTarget},
};
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

pub const AI_CLAIMANT: &str = "AI Analysis";
pub const AI_PUBLISHER: &str = "AI Fact Checker";
pub const AI_DEFAULT_RATING: &str = "Unverified";

/// The fixed-shape verdict the model is asked for. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AiVerdictPayload {
    text: Option<String>,
    claimant: Option<String>,
    rating: Option<String>,
    publisher: Option<String>,
    date: Option<String>,
    url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// The generative-model tier of the chain.
#[derive(Debug, Clone)]
pub struct AiFactFallback {
    provider: Box<dyn AiProvider>,
    system_prompt: String,
    user_prompt: String,
}

impl AiFactFallback {
    pub fn new(provider: Box<dyn AiProvider>, system_prompt: String, user_prompt: String) -> Self {
        Self {
            provider,
            system_prompt,
            user_prompt,
        }
    }

    /// Asks the model for a verdict. Model errors and unparseable replies are `None`.
    pub async fn verdict(&self, query: &str, context: &[String]) -> Option<FactCheckEntry> {
        let user_prompt = render(&self.user_prompt, query, &context.join("\n"));
        let reply = match self.provider.generate(&self.system_prompt, &user_prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(component = "ai-fallback", error = %e, "Generative fallback failed.");
                return None;
            }
        };
        debug!(reply = %reply, "<-- Generative fallback reply");

        let parsed = extract_json_object(&reply).and_then(|value| {
            value
                .map(serde_json::from_value::<AiVerdictPayload>)
                .transpose()
                .map_err(CacheError::from)
        });
        let payload = match parsed {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                warn!(component = "ai-fallback", "Reply contained no JSON object.");
                return None;
            }
            Err(e) => {
                warn!(component = "ai-fallback", error = %e, "Reply could not be parsed.");
                return None;
            }
        };

        let key = normalize_query(query);
        Some(FactCheckEntry {
            query: key,
            claim_text: non_blank(payload.text).unwrap_or_else(|| query.trim().to_string()),
            claimant: non_blank(payload.claimant).unwrap_or_else(|| AI_CLAIMANT.to_string()),
            rating: non_blank(payload.rating).unwrap_or_else(|| AI_DEFAULT_RATING.to_string()),
            publisher: non_blank(payload.publisher).unwrap_or_else(|| AI_PUBLISHER.to_string()),
            date: non_blank(payload.date).unwrap_or_else(|| {
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            }),
            url: non_blank(payload.url).unwrap_or_else(|| "#".to_string()),
            origin_provider: OriginProvider::AiAgent,
            created_at: Utc::now(),
        })
    }
}

/// A resolved entry plus the snippets the secondary providers returned along the way.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub entry: Option<FactCheckEntry>,
    pub context: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderChain {
    providers: FactProviders,
    fallback: Option<AiFactFallback>,
    embedded: EmbeddedStore,
    durable: DurablePool,
}

impl ProviderChain {
    pub fn new(
        providers: FactProviders,
        fallback: Option<AiFactFallback>,
        embedded: EmbeddedStore,
        durable: DurablePool,
    ) -> Self {
        Self {
            providers,
            fallback,
            embedded,
            durable,
        }
    }

    /// Resolves `query` through the chain and persists any result into both stores.
    pub async fn resolve(&self, query: &str) -> Outcome<Option<FactCheckEntry>> {
        self.resolve_with_context(query).await.map(|r| r.entry)
    }

    /// Like [`ProviderChain::resolve`], also returning the secondary providers' snippets.
    pub async fn resolve_with_context(&self, query: &str) -> Outcome<Resolution> {
        let text = query.trim();
        let key = normalize_query(text);
        if key.is_empty() {
            return Outcome::new(Resolution::default());
        }

        let resolution = self.run_chain(text, &key).await;
        let Some(entry) = &resolution.entry else {
            info!(query = %key, "Provider chain exhausted without a result.");
            return Outcome::new(resolution);
        };

        info!(query = %key, source = entry.origin_provider.as_str(), "Provider chain resolved query.");
        let embedded = self.persist_embedded(entry).await;
        let durable = self.persist_durable(entry).await;
        Outcome::new(resolution)
            .with_side_write(embedded)
            .with_side_write(durable)
    }

    async fn run_chain(&self, text: &str, key: &str) -> Resolution {
        if let Some(provider) = &self.providers.authoritative {
            if let Some(payload) = query_isolated(provider.as_ref(), text).await {
                if let Some(entry) = map_isolated(provider.name(), payload, key) {
                    return Resolution {
                        entry: Some(entry),
                        context: Vec::new(),
                    };
                }
            }
        }

        // Independent providers run concurrently; the first non-empty one in configured order wins.
        let answers = join_all(self.providers.secondary.iter().map(|p| async move {
            (p.name().to_string(), query_isolated(p.as_ref(), text).await)
        }))
        .await;

        let mut context = Vec::new();
        let mut winner = None;
        for (name, payload) in answers {
            let Some(payload) = payload else { continue };
            context.extend(payload.snippets());
            if winner.is_none() {
                winner = map_isolated(&name, payload, key);
            }
        }
        if winner.is_some() {
            return Resolution {
                entry: winner,
                context,
            };
        }

        let entry = match &self.fallback {
            Some(fallback) => fallback.verdict(text, &context).await,
            None => {
                debug!("No generative fallback configured.");
                None
            }
        };
        Resolution { entry, context }
    }

    async fn persist_embedded(&self, entry: &FactCheckEntry) -> SideWrite {
        match self.embedded.upsert_fact(entry).await {
            Ok(()) => SideWrite::Applied {
                target: StoreTarget::Embedded,
            },
            Err(e) => {
                warn!(component = "embedded", query = %entry.query, error = %e, "Failed to cache resolved entry.");
                SideWrite::Failed {
                    target: StoreTarget::Embedded,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn persist_durable(&self, entry: &FactCheckEntry) -> SideWrite {
        if !self.durable.is_configured() {
            return SideWrite::Skipped {
                target: StoreTarget::Durable,
                reason: "durable store is not configured".to_string(),
            };
        }
        let result = match self.durable.get().await {
            Ok(handle) => handle.records().upsert_fact(entry).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => SideWrite::Applied {
                target: StoreTarget::Durable,
            },
            Err(e) => {
                warn!(component = "durable", query = %entry.query, error = %e, "Failed to store resolved entry remotely.");
                SideWrite::Failed {
                    target: StoreTarget::Durable,
                    error: e.to_string(),
                }
            }
        }
    }
}

async fn query_isolated(provider: &dyn FactProvider, text: &str) -> Option<ProviderPayload> {
    match provider.query(text).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "Provider failed; continuing chain.");
            None
        }
    }
}

fn map_isolated(provider: &str, payload: ProviderPayload, key: &str) -> Option<FactCheckEntry> {
    match payload.into_entry(key) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(provider = %provider, error = %e, "Provider payload rejected; continuing chain.");
            None
        }
    }
}
