use super::{Collection, DurableConnector, DurableStore, Filter};
use crate::errors::CacheError;
use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

type Collections = HashMap<Collection, BTreeMap<String, Value>>;

/// A process-local Durable Store.
///
/// Clones share state. Reachability can be switched off to simulate an outage, upserts of
/// individual keys can be made to fail, and whole-collection scans can be made to time out.
#[derive(Debug, Clone, Default)]
pub struct MemoryDurableStore {
    docs: Arc<RwLock<Collections>>,
    unreachable: Arc<AtomicBool>,
    failing_keys: Arc<RwLock<HashSet<String>>>,
    failing_scans: Arc<RwLock<HashSet<Collection>>>,
    connects: Arc<AtomicUsize>,
    upserts: Arc<AtomicUsize>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Makes every upsert of `key` fail with a storage error.
    pub fn fail_upserts_for(&self, key: &str) {
        if let Ok(mut keys) = self.failing_keys.write() {
            keys.insert(key.to_string());
        }
    }

    /// Makes every unfiltered `find` on `collection` fail as if it had timed out.
    pub fn fail_scans_of(&self, collection: Collection) {
        if let Ok(mut scans) = self.failing_scans.write() {
            scans.insert(collection);
        }
    }

    /// How many times a connector has connected to this store.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// How many upserts have been applied.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// All documents of one collection, ordered by key.
    pub fn snapshot(&self, collection: Collection) -> Vec<Value> {
        self.docs
            .read()
            .map(|docs| {
                docs.get(&collection)
                    .map(|c| c.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn check_reachable(&self) -> Result<(), CacheError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(CacheError::Connectivity(
                "in-memory durable store is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn matching(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>, CacheError> {
        let docs = self
            .docs
            .read()
            .map_err(|e| CacheError::Durable(e.to_string()))?;
        Ok(docs
            .get(&collection)
            .map(|c| {
                c.values()
                    .filter(|doc| matches_filter(doc, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn matches_filter(doc: &Value, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(field, expected)| doc.get(field) == Some(expected))
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn ping(&self) -> Result<(), CacheError> {
        self.check_reachable()
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Value>, CacheError> {
        self.check_reachable()?;
        let failing = filter.is_empty()
            && self
                .failing_scans
                .read()
                .map(|scans| scans.contains(&collection))
                .unwrap_or(false);
        if failing {
            return Err(CacheError::Connectivity(format!(
                "scan of {collection} timed out"
            )));
        }
        self.matching(collection, filter)
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Value>, CacheError> {
        self.check_reachable()?;
        Ok(self.matching(collection, filter)?.into_iter().next())
    }

    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        doc: &Value,
    ) -> Result<Value, CacheError> {
        self.check_reachable()?;
        let failing = self
            .failing_keys
            .read()
            .map(|keys| keys.contains(key))
            .unwrap_or(false);
        if failing {
            return Err(CacheError::Durable(format!(
                "write of '{key}' to {collection} rejected"
            )));
        }
        let mut stored = doc.clone();
        if let Some(obj) = stored.as_object_mut() {
            obj.insert(
                collection.key_field().to_string(),
                Value::String(key.to_string()),
            );
        }
        let mut docs = self
            .docs
            .write()
            .map_err(|e| CacheError::Durable(e.to_string()))?;
        docs.entry(collection)
            .or_default()
            .insert(key.to_string(), stored.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, CacheError> {
        self.check_reachable()?;
        let mut docs = self
            .docs
            .write()
            .map_err(|e| CacheError::Durable(e.to_string()))?;
        let Some(coll) = docs.get_mut(&collection) else {
            return Ok(0);
        };
        let before = coll.len();
        coll.retain(|_, doc| !matches_filter(doc, filter));
        Ok((before - coll.len()) as u64)
    }
}

/// Connects a [`DurablePool`](super::DurablePool) to a [`MemoryDurableStore`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    store: MemoryDurableStore,
}

impl MemoryConnector {
    pub fn new(store: MemoryDurableStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DurableConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn DurableStore>, CacheError> {
        self.store.check_reachable()?;
        self.store.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.store.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::db::durable::filter;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_replaces_by_key_and_filters_by_equality() {
        let store = MemoryDurableStore::new();
        store
            .upsert(Collection::Chats, "c1", &json!({"userId": "a", "text": "x"}))
            .await
            .unwrap();
        store
            .upsert(Collection::Chats, "c1", &json!({"userId": "a", "text": "y"}))
            .await
            .unwrap();
        store
            .upsert(Collection::Chats, "c2", &json!({"userId": "b", "text": "y"}))
            .await
            .unwrap();

        let mine = store
            .find(Collection::Chats, &filter([("userId", json!("a"))]))
            .await
            .unwrap();
        assert_eq!(mine, vec![json!({"id": "c1", "userId": "a", "text": "y"})]);

        let removed = store
            .delete_many(Collection::Chats, &filter([("text", json!("y"))]))
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn failure_injection_targets_one_key() {
        let store = MemoryDurableStore::new();
        store.fail_upserts_for("bad");
        assert!(store
            .upsert(Collection::Users, "bad", &json!({}))
            .await
            .is_err());
        assert!(store
            .upsert(Collection::Users, "good", &json!({}))
            .await
            .is_ok());
    }
}
