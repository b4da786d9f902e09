//! Chat records: owner-scoped lookups, saves, history and deletes across both stores.
//!
//! Authenticated writes go to the Durable Store first and abort when it fails; the
//! Embedded Store copy is best effort. Guest records live in the Embedded Store only.

use crate::{
    constants::{GUEST_OWNER_ID, HISTORY_LIMIT},
    errors::CacheError,
    keys::{image_content_hash, normalize_query},
    providers::db::{durable::DurablePool, sqlite::EmbeddedStore},
    types::{CacheHit, ChatRecord, Outcome, SideWrite, StoreTarget},
    waterfall::{CacheWaterfall, LookupKey},
};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ChatService {
    embedded: EmbeddedStore,
    durable: DurablePool,
    waterfall: CacheWaterfall,
}

impl ChatService {
    pub fn new(embedded: EmbeddedStore, durable: DurablePool) -> Self {
        let waterfall = CacheWaterfall::new(embedded.clone(), durable.clone());
        Self {
            embedded,
            durable,
            waterfall,
        }
    }

    /// The owner's cached chat for this claim text, if any.
    pub async fn lookup_text(
        &self,
        text: &str,
        owner_id: &str,
    ) -> Result<Outcome<Option<CacheHit>>, CacheError> {
        if normalize_query(text).is_empty() {
            return Err(CacheError::Validation("Query text is required".to_string()));
        }
        Ok(self
            .waterfall
            .resolve_claim(&LookupKey::ChatText(text.to_string()), owner_id)
            .await)
    }

    /// The owner's cached chat for this image. Accepts raw base64 or a data URI.
    pub async fn lookup_image(
        &self,
        image_base64: &str,
        owner_id: &str,
    ) -> Result<Outcome<Option<CacheHit>>, CacheError> {
        if image_base64.trim().is_empty() {
            return Err(CacheError::Validation("Image data is required".to_string()));
        }
        self.lookup_image_hash(&image_content_hash(image_base64), owner_id)
            .await
    }

    pub async fn lookup_image_hash(
        &self,
        image_hash: &str,
        owner_id: &str,
    ) -> Result<Outcome<Option<CacheHit>>, CacheError> {
        let hash = image_hash.trim();
        if hash.is_empty() {
            return Err(CacheError::Validation("Image hash is required".to_string()));
        }
        Ok(self
            .waterfall
            .resolve_claim(&LookupKey::ChatImage(hash.to_string()), owner_id)
            .await)
    }

    /// Saves a chat record, filling in its id and image hash when missing.
    pub async fn save(&self, mut chat: ChatRecord) -> Result<Outcome<ChatRecord>, CacheError> {
        if chat.claim_text.trim().is_empty() && chat.image_base64.is_none() {
            return Err(CacheError::Validation(
                "A chat needs claim text or an image".to_string(),
            ));
        }
        if chat.id.trim().is_empty() {
            chat.id = Uuid::new_v4().to_string();
        }
        if chat.owner_id.trim().is_empty() {
            chat.owner_id = GUEST_OWNER_ID.to_string();
        }
        if chat.image_hash.is_none() {
            chat.image_hash = chat.image_base64.as_deref().map(image_content_hash);
        }

        if chat.is_guest() {
            self.embedded.upsert_chat(&chat).await?;
            debug!(chat_id = %chat.id, "Saved guest chat locally.");
            return Ok(Outcome::new(chat).with_side_write(SideWrite::Skipped {
                target: StoreTarget::Durable,
                reason: "guest records are not synced".to_string(),
            }));
        }

        let handle = self.durable.get().await?;
        handle.records().upsert_chat(&chat).await?;
        let side_write = match self.embedded.upsert_chat(&chat).await {
            Ok(()) => SideWrite::Applied {
                target: StoreTarget::Embedded,
            },
            Err(e) => {
                warn!(component = "embedded", chat_id = %chat.id, error = %e, "Local copy of saved chat failed.");
                SideWrite::Failed {
                    target: StoreTarget::Embedded,
                    error: e.to_string(),
                }
            }
        };
        Ok(Outcome::new(chat).with_side_write(side_write))
    }

    /// The owner's newest chats. Read from the Durable Store when reachable.
    pub async fn history(&self, owner_id: &str) -> Result<Vec<ChatRecord>, CacheError> {
        if owner_id != GUEST_OWNER_ID {
            let remote = match self.durable.get().await {
                Ok(handle) => {
                    handle
                        .records()
                        .chat_history(owner_id, HISTORY_LIMIT as usize)
                        .await
                }
                Err(e) => Err(e),
            };
            match remote {
                Ok(chats) => return Ok(chats),
                Err(e) => {
                    warn!(component = "durable", owner = %owner_id, error = %e, "History falls back to embedded store.");
                }
            }
        }
        self.embedded.chat_history(owner_id, HISTORY_LIMIT).await
    }

    /// Deletes one of the owner's chats. Returns whether anything was removed.
    ///
    /// This is the only path that removes a chat from the Durable Store.
    pub async fn delete(&self, id: &str, owner_id: &str) -> Result<Outcome<bool>, CacheError> {
        if id.trim().is_empty() {
            return Err(CacheError::Validation("Chat id is required".to_string()));
        }
        if owner_id == GUEST_OWNER_ID {
            return Ok(Outcome::new(self.embedded.delete_chat(id, owner_id).await?));
        }

        let handle = self.durable.get().await?;
        let removed_remote = handle.records().delete_chat(id, owner_id).await?;
        let (removed_local, side_write) = match self.embedded.delete_chat(id, owner_id).await {
            Ok(removed) => (
                removed,
                SideWrite::Applied {
                    target: StoreTarget::Embedded,
                },
            ),
            Err(e) => {
                warn!(component = "embedded", chat_id = %id, error = %e, "Local delete failed.");
                (
                    false,
                    SideWrite::Failed {
                        target: StoreTarget::Embedded,
                        error: e.to_string(),
                    },
                )
            }
        };
        Ok(Outcome::new(removed_remote > 0 || removed_local).with_side_write(side_write))
    }
}
