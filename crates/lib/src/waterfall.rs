//! # Cache Waterfall Reader
//!
//! Resolves a lookup key against the Embedded Store first, then the Durable Store,
//! filling the Embedded Store on a durable hit. A miss in both tiers is `None`; the
//! caller then decides whether to consult the provider chain.
//!
//! The reader never fails. A tier that errors or cannot be reached is logged and
//! skipped, so an outage of the Durable Store degrades to embedded-only reads.

use crate::{
    constants::GUEST_OWNER_ID,
    keys::normalize_query,
    providers::db::{durable::DurablePool, sqlite::EmbeddedStore},
    types::{CacheHit, CachedRecord, OriginTier, Outcome, SideWrite, StoreTarget},
};
use tracing::{debug, info, warn};

/// What is being looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    /// A shared fact-check entry, by query text.
    Fact(String),
    /// An owner's chat record, by claim text.
    ChatText(String),
    /// An owner's chat record, by image content hash.
    ChatImage(String),
}

impl LookupKey {
    /// The key as used against the stores. Text keys are normalized; hashes are exact.
    pub fn normalized(&self) -> String {
        match self {
            LookupKey::Fact(text) | LookupKey::ChatText(text) => normalize_query(text),
            LookupKey::ChatImage(hash) => hash.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheWaterfall {
    embedded: EmbeddedStore,
    durable: DurablePool,
}

impl CacheWaterfall {
    pub fn new(embedded: EmbeddedStore, durable: DurablePool) -> Self {
        Self { embedded, durable }
    }

    /// Resolves `key` for `owner_id`, strictly Embedded then Durable.
    ///
    /// Chat records are only ever returned to their owner. Fact-check entries are global.
    /// Guest chat lookups never leave the Embedded Store.
    pub async fn resolve_claim(&self, key: &LookupKey, owner_id: &str) -> Outcome<Option<CacheHit>> {
        let normalized = key.normalized();
        if normalized.is_empty() {
            return Outcome::new(None);
        }

        if let Some(record) = self.from_embedded(key, &normalized, owner_id).await {
            debug!(key = %normalized, owner = %owner_id, "Cache hit (embedded).");
            return Outcome::new(Some(CacheHit {
                record,
                origin: OriginTier::Embedded,
            }));
        }

        let Some(record) = self.from_durable(key, &normalized, owner_id).await else {
            debug!(key = %normalized, owner = %owner_id, "Cache miss.");
            return Outcome::new(None);
        };

        info!(key = %normalized, owner = %owner_id, "Cache hit (durable); writing through.");
        let side_write = self.write_through(&record).await;
        Outcome::new(Some(CacheHit {
            record,
            origin: OriginTier::Durable,
        }))
        .with_side_write(side_write)
    }

    async fn from_embedded(
        &self,
        key: &LookupKey,
        normalized: &str,
        owner_id: &str,
    ) -> Option<CachedRecord> {
        let result = match key {
            LookupKey::Fact(_) => self
                .embedded
                .find_fact(normalized)
                .await
                .map(|f| f.map(CachedRecord::Fact)),
            LookupKey::ChatText(_) => self
                .embedded
                .find_chat_by_text(normalized, owner_id)
                .await
                .map(|c| c.map(CachedRecord::Chat)),
            LookupKey::ChatImage(_) => self
                .embedded
                .find_chat_by_image_hash(normalized, owner_id)
                .await
                .map(|c| c.map(CachedRecord::Chat)),
        };
        match result {
            Ok(record) => record.filter(|r| visible_to(r, owner_id)),
            Err(e) => {
                warn!(component = "embedded", key = %normalized, error = %e, "Embedded lookup failed; trying durable store.");
                None
            }
        }
    }

    async fn from_durable(
        &self,
        key: &LookupKey,
        normalized: &str,
        owner_id: &str,
    ) -> Option<CachedRecord> {
        // Guest chats are never synced, so the Durable Store cannot hold one.
        if owner_id == GUEST_OWNER_ID && !matches!(key, LookupKey::Fact(_)) {
            return None;
        }
        let handle = match self.durable.get().await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(component = "durable", error = %e, "Durable store unavailable; embedded-only lookup.");
                return None;
            }
        };
        let records = handle.records();
        let result = match key {
            LookupKey::Fact(_) => records
                .find_fact(normalized)
                .await
                .map(|f| f.map(CachedRecord::Fact)),
            LookupKey::ChatText(text) => records
                .find_chat_by_text(text, owner_id)
                .await
                .map(|c| c.map(CachedRecord::Chat)),
            LookupKey::ChatImage(_) => records
                .find_chat_by_image_hash(normalized, owner_id)
                .await
                .map(|c| c.map(CachedRecord::Chat)),
        };
        match result {
            Ok(record) => record.filter(|r| visible_to(r, owner_id)),
            Err(e) => {
                warn!(component = "durable", key = %normalized, error = %e, "Durable lookup failed; treating as miss.");
                None
            }
        }
    }

    async fn write_through(&self, record: &CachedRecord) -> SideWrite {
        let result = match record {
            CachedRecord::Fact(entry) => self.embedded.upsert_fact(entry).await,
            CachedRecord::Chat(chat) => self.embedded.upsert_chat(chat).await,
        };
        match result {
            Ok(()) => SideWrite::Applied {
                target: StoreTarget::Embedded,
            },
            Err(e) => {
                warn!(component = "embedded", error = %e, "Write-through failed.");
                SideWrite::Failed {
                    target: StoreTarget::Embedded,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Private records are visible to their owner only.
fn visible_to(record: &CachedRecord, owner_id: &str) -> bool {
    match record {
        CachedRecord::Fact(_) => true,
        CachedRecord::Chat(chat) => chat.owner_id == owner_id,
    }
}
