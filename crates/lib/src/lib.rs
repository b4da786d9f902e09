//! # Axiant
//!
//! The dual-store cache and reconciliation core of Axiant Intelligence.
//!
//! Claims are looked up through a cache waterfall (local Embedded Store, then the remote
//! Durable Store), then through a chain of external fact-check providers ending in a
//! language model. A reconciler keeps the two stores in step. [`AxiantCore`] wires the
//! pieces together from one Embedded Store, one Durable Store pool and the configured
//! providers.

pub mod analysis;
pub mod chats;
pub mod constants;
pub mod errors;
pub mod fact_check;
pub mod keys;
pub mod prompts;
pub mod providers;
pub mod reconcile;
pub mod resolver;
pub mod types;
pub mod waterfall;

pub use analysis::{AnalysisRequest, AnalysisResult, AnalysisService, Analyzer};
pub use chats::ChatService;
pub use errors::CacheError;
pub use fact_check::{FactCheckFound, FactChecker};
pub use providers::db::{
    durable::{DurablePool, DurableStore},
    sqlite::EmbeddedStore,
};
pub use reconcile::{ReconcileReport, Reconciler};
pub use resolver::{AiFactFallback, ProviderChain};
pub use types::{CacheHit, ChatRecord, FactCheckEntry, Outcome, SideWrite, User};
pub use waterfall::{CacheWaterfall, LookupKey};

use providers::facts::FactProviders;
use tracing::info;

/// Every service of the core, sharing one Embedded Store and one Durable Store pool.
#[derive(Debug, Clone)]
pub struct AxiantCore {
    pub embedded: EmbeddedStore,
    pub durable: DurablePool,
    pub waterfall: CacheWaterfall,
    pub facts: FactChecker,
    pub chats: ChatService,
    pub analysis: AnalysisService,
    pub reconciler: Reconciler,
}

/// A builder for [`AxiantCore`].
#[derive(Debug, Default)]
pub struct AxiantCoreBuilder {
    embedded: Option<EmbeddedStore>,
    durable: Option<DurablePool>,
    fact_providers: FactProviders,
    fact_fallback: Option<AiFactFallback>,
    analyzer: Option<Analyzer>,
}

impl AxiantCoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Embedded Store. Required.
    pub fn embedded(mut self, embedded: EmbeddedStore) -> Self {
        self.embedded = Some(embedded);
        self
    }

    /// Sets the Durable Store pool. Without one the core runs embedded-only.
    pub fn durable(mut self, durable: DurablePool) -> Self {
        self.durable = Some(durable);
        self
    }

    pub fn fact_providers(mut self, providers: FactProviders) -> Self {
        self.fact_providers = providers;
        self
    }

    /// Sets the generative fallback at the end of the provider chain.
    pub fn fact_fallback(mut self, fallback: AiFactFallback) -> Self {
        self.fact_fallback = Some(fallback);
        self
    }

    pub fn analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn build(self) -> Result<AxiantCore, CacheError> {
        let embedded = self
            .embedded
            .ok_or_else(|| CacheError::Storage("an embedded store is required".to_string()))?;
        let durable = self.durable.unwrap_or_else(DurablePool::disabled);
        if !durable.is_configured() {
            info!("No durable store configured; running embedded-only.");
        }

        let waterfall = CacheWaterfall::new(embedded.clone(), durable.clone());
        let chain = ProviderChain::new(
            self.fact_providers,
            self.fact_fallback,
            embedded.clone(),
            durable.clone(),
        );
        let facts = FactChecker::new(waterfall.clone(), chain);
        let chats = ChatService::new(embedded.clone(), durable.clone());
        let analysis = AnalysisService::new(chats.clone(), facts.clone(), self.analyzer);
        let reconciler = Reconciler::new(embedded.clone(), durable.clone());

        Ok(AxiantCore {
            embedded,
            durable,
            waterfall,
            facts,
            chats,
            analysis,
            reconciler,
        })
    }
}
