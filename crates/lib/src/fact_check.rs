//! Fact-check lookups: the cache waterfall first, the provider chain on a full miss.

use crate::{
    constants::GUEST_OWNER_ID,
    errors::CacheError,
    keys::normalize_query,
    resolver::{ProviderChain, Resolution},
    types::{CachedRecord, FactCheckEntry, OriginTier, Outcome},
    waterfall::{CacheWaterfall, LookupKey},
};
use tracing::info;

/// Source tag of an entry served from the Embedded Store.
pub const SOURCE_CACHE_LOCAL: &str = "cache-local";
/// Source tag of an entry served from the Durable Store.
pub const SOURCE_CACHE_CLOUD: &str = "cache-cloud";

/// A found entry and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FactCheckFound {
    pub entry: FactCheckEntry,
    /// `cache-local`, `cache-cloud`, or the provider's origin tag.
    pub source: String,
    pub origin: OriginTier,
}

/// The outcome of a lookup that also kept the secondary providers' snippets.
#[derive(Debug, Clone, Default)]
pub struct FactCheckReport {
    pub found: Option<FactCheckFound>,
    pub context: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FactChecker {
    waterfall: CacheWaterfall,
    chain: ProviderChain,
}

impl FactChecker {
    pub fn new(waterfall: CacheWaterfall, chain: ProviderChain) -> Self {
        Self { waterfall, chain }
    }

    /// Looks up a fact-check for `query`. Only an empty query is an error.
    pub async fn check(&self, query: &str) -> Result<Outcome<Option<FactCheckFound>>, CacheError> {
        Ok(self.check_with_context(query).await?.map(|r| r.found))
    }

    pub async fn check_with_context(
        &self,
        query: &str,
    ) -> Result<Outcome<FactCheckReport>, CacheError> {
        let key = normalize_query(query);
        if key.is_empty() {
            return Err(CacheError::Validation("Query is required".to_string()));
        }

        // Fact-check entries are global; the owner is irrelevant to the lookup.
        let cached = self
            .waterfall
            .resolve_claim(&LookupKey::Fact(key.clone()), GUEST_OWNER_ID)
            .await;
        let mut side_writes = cached.side_writes;
        if let Some(hit) = cached.value {
            if let CachedRecord::Fact(entry) = hit.record {
                let source = match hit.origin {
                    OriginTier::Embedded => SOURCE_CACHE_LOCAL,
                    OriginTier::Durable => SOURCE_CACHE_CLOUD,
                    OriginTier::Provider => entry.origin_provider.as_str(),
                }
                .to_string();
                info!(query = %key, source = %source, "Fact-check served from cache.");
                return Ok(Outcome {
                    value: FactCheckReport {
                        found: Some(FactCheckFound {
                            entry,
                            source,
                            origin: hit.origin,
                        }),
                        context: Vec::new(),
                    },
                    side_writes,
                });
            }
        }

        let resolved = self.chain.resolve_with_context(query).await;
        side_writes.extend(resolved.side_writes);
        let Resolution { entry, context } = resolved.value;
        let found = entry.map(|entry| FactCheckFound {
            source: entry.origin_provider.as_str().to_string(),
            entry,
            origin: OriginTier::Provider,
        });
        Ok(Outcome {
            value: FactCheckReport { found, context },
            side_writes,
        })
    }
}
