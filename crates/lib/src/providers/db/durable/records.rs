//! Typed access to the Durable Store collections.

use super::{filter, Collection, DurableHandle};
use crate::{
    errors::CacheError,
    keys::normalize_query,
    types::{ChatRecord, FactCheckEntry, User},
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

/// Documents of one collection decoded into records, plus the ones that failed to decode.
#[derive(Debug, Clone)]
pub struct DecodedBatch<T> {
    pub records: Vec<T>,
    pub rejected: Vec<String>,
}

/// Maps documents of the three collections to their record types.
#[derive(Debug, Clone, Copy)]
pub struct DurableRecords<'a> {
    handle: &'a DurableHandle,
}

fn decode<T: DeserializeOwned>(collection: Collection, doc: Value) -> Result<T, CacheError> {
    serde_json::from_value(doc).map_err(|e| {
        CacheError::Durable(format!("malformed document in {collection}: {e}"))
    })
}

/// A record with a primary key in the Durable Store.
pub trait Keyed {
    /// The key as both stores index it. Blank means the record cannot be stored.
    fn store_key(&self) -> String;
}

impl Keyed for User {
    fn store_key(&self) -> String {
        self.id.trim().to_string()
    }
}

impl Keyed for ChatRecord {
    fn store_key(&self) -> String {
        self.id.trim().to_string()
    }
}

impl Keyed for FactCheckEntry {
    fn store_key(&self) -> String {
        normalize_query(&self.query)
    }
}

// Documents that fail to decode, or decode with a blank key, are rejected one by one
// so the rest of the collection still goes through.
fn decode_batch<T: DeserializeOwned + Keyed>(
    collection: Collection,
    docs: Vec<Value>,
) -> DecodedBatch<T> {
    let mut batch = DecodedBatch {
        records: Vec::with_capacity(docs.len()),
        rejected: Vec::new(),
    };
    for doc in docs {
        let key = doc
            .get(collection.key_field())
            .and_then(Value::as_str)
            .filter(|k| !k.trim().is_empty())
            .unwrap_or("<no key>")
            .to_string();
        match decode::<T>(collection, doc) {
            Ok(record) if record.store_key().is_empty() => {
                warn!(collection = %collection, "Skipping durable document with a blank key.");
                batch
                    .rejected
                    .push(format!("{collection} {key}: blank {}", collection.key_field()));
            }
            Ok(record) => batch.records.push(record),
            Err(e) => {
                warn!(collection = %collection, key = %key, error = %e, "Skipping malformed durable document.");
                batch.rejected.push(format!("{collection} {key}: {e}"));
            }
        }
    }
    batch
}

fn encode<T: Serialize>(record: &T) -> Result<Value, CacheError> {
    Ok(serde_json::to_value(record)?)
}

impl<'a> DurableRecords<'a> {
    pub fn new(handle: &'a DurableHandle) -> Self {
        Self { handle }
    }

    // --- users ---

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CacheError> {
        self.handle
            .find_one(Collection::Users, &filter([("email", json!(email))]))
            .await?
            .map(|doc| decode(Collection::Users, doc))
            .transpose()
    }

    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, CacheError> {
        self.handle
            .find_one(Collection::Users, &filter([("id", json!(id))]))
            .await?
            .map(|doc| decode(Collection::Users, doc))
            .transpose()
    }

    pub async fn list_users(&self) -> Result<DecodedBatch<User>, CacheError> {
        let docs = self
            .handle
            .find(Collection::Users, &Default::default())
            .await?;
        Ok(decode_batch(Collection::Users, docs))
    }

    pub async fn upsert_user(&self, user: &User) -> Result<(), CacheError> {
        self.handle
            .upsert(Collection::Users, &user.id, &encode(user)?)
            .await?;
        Ok(())
    }

    // --- chats ---

    /// Chat documents carry a `lookupKey` so that lookups can be normalized server-side.
    pub async fn upsert_chat(&self, chat: &ChatRecord) -> Result<(), CacheError> {
        let mut doc = encode(chat)?;
        if let Some(obj) = doc.as_object_mut() {
            obj.insert(
                "lookupKey".to_string(),
                Value::String(normalize_query(&chat.claim_text)),
            );
        }
        self.handle.upsert(Collection::Chats, &chat.id, &doc).await?;
        Ok(())
    }

    /// Finds an owner's chat by normalized claim text.
    ///
    /// Documents written before `lookupKey` existed are matched on their trimmed text.
    pub async fn find_chat_by_text(
        &self,
        text: &str,
        owner_id: &str,
    ) -> Result<Option<ChatRecord>, CacheError> {
        let by_key = filter([
            ("lookupKey", json!(normalize_query(text))),
            ("userId", json!(owner_id)),
        ]);
        if let Some(doc) = self.handle.find_one(Collection::Chats, &by_key).await? {
            return decode(Collection::Chats, doc).map(Some);
        }
        let by_text = filter([("text", json!(text.trim())), ("userId", json!(owner_id))]);
        self.handle
            .find_one(Collection::Chats, &by_text)
            .await?
            .map(|doc| decode(Collection::Chats, doc))
            .transpose()
    }

    pub async fn find_chat_by_image_hash(
        &self,
        image_hash: &str,
        owner_id: &str,
    ) -> Result<Option<ChatRecord>, CacheError> {
        let f = filter([("imageHash", json!(image_hash)), ("userId", json!(owner_id))]);
        self.handle
            .find_one(Collection::Chats, &f)
            .await?
            .map(|doc| decode(Collection::Chats, doc))
            .transpose()
    }

    pub async fn chat_history(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, CacheError> {
        let docs = self
            .handle
            .find_latest(
                Collection::Chats,
                &filter([("userId", json!(owner_id))]),
                "createdAt",
                limit,
            )
            .await?;
        Ok(decode_batch(Collection::Chats, docs).records)
    }

    pub async fn list_chats(&self) -> Result<DecodedBatch<ChatRecord>, CacheError> {
        let docs = self
            .handle
            .find(Collection::Chats, &Default::default())
            .await?;
        Ok(decode_batch(Collection::Chats, docs))
    }

    /// Deletes a chat only if it belongs to `owner_id`.
    pub async fn delete_chat(&self, id: &str, owner_id: &str) -> Result<u64, CacheError> {
        self.handle
            .delete_many(
                Collection::Chats,
                &filter([("id", json!(id)), ("userId", json!(owner_id))]),
            )
            .await
    }

    // --- fact checks ---

    pub async fn find_fact(&self, query: &str) -> Result<Option<FactCheckEntry>, CacheError> {
        let f = filter([("query", json!(normalize_query(query)))]);
        self.handle
            .find_one(Collection::FactChecks, &f)
            .await?
            .map(|doc| decode(Collection::FactChecks, doc))
            .transpose()
    }

    pub async fn list_facts(&self) -> Result<DecodedBatch<FactCheckEntry>, CacheError> {
        let docs = self
            .handle
            .find(Collection::FactChecks, &Default::default())
            .await?;
        Ok(decode_batch(Collection::FactChecks, docs))
    }

    pub async fn upsert_fact(&self, entry: &FactCheckEntry) -> Result<(), CacheError> {
        let key = normalize_query(&entry.query);
        let mut normalized = entry.clone();
        normalized.query = key.clone();
        self.handle
            .upsert(Collection::FactChecks, &key, &encode(&normalized)?)
            .await?;
        Ok(())
    }
}
