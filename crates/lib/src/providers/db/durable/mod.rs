//! # Durable Store
//!
//! The remote system of record. Access goes through the [`DurableStore`] trait, which
//! speaks JSON documents and equality filters, so the cache layers never touch a driver
//! type directly. A [`DurablePool`] owns the connect-once/reuse/reconnect lifecycle and
//! hands out [`DurableHandle`]s whose every call is bounded by a timeout. Full-collection
//! scans get a wider bound than point operations.

pub mod memory;
pub mod mongo;
pub mod records;

use crate::errors::CacheError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{
    fmt::{self, Debug},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use memory::{MemoryConnector, MemoryDurableStore};
pub use mongo::{MongoConnector, MongoDurableStore};
pub use records::{DecodedBatch, DurableRecords, Keyed};

/// How many point-operation timeouts a full-collection scan may take.
const SCAN_TIMEOUT_FACTOR: u32 = 6;

/// An equality filter: every field must equal the given value.
pub type Filter = Map<String, Value>;

/// Builds a [`Filter`] from `(field, value)` pairs.
pub fn filter<const N: usize>(pairs: [(&str, Value); N]) -> Filter {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// The three logical collections held by the Durable Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Chats,
    FactChecks,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Chats => "chats",
            Collection::FactChecks => "factchecks",
        }
    }

    /// The document field that holds the primary key.
    pub fn key_field(&self) -> &'static str {
        match self {
            Collection::Users | Collection::Chats => "id",
            Collection::FactChecks => "query",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A document store holding the three collections.
///
/// Documents are JSON objects whose primary key lives in [`Collection::key_field`].
#[async_trait]
pub trait DurableStore: Send + Sync + Debug {
    /// Round-trips to the server. `Connectivity` when it cannot be reached.
    async fn ping(&self) -> Result<(), CacheError>;

    async fn find(&self, collection: Collection, filter: &Filter)
        -> Result<Vec<Value>, CacheError>;

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Value>, CacheError>;

    /// Newest-first documents matching `filter`, ordered by the `sort_field` value.
    async fn find_latest(
        &self,
        collection: Collection,
        filter: &Filter,
        sort_field: &str,
        limit: usize,
    ) -> Result<Vec<Value>, CacheError> {
        let mut docs = self.find(collection, filter).await?;
        let sort_key = |doc: &Value| {
            doc.get(sort_field)
                .and_then(Value::as_str)
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        };
        docs.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
        docs.truncate(limit);
        Ok(docs)
    }

    /// Creates or fully replaces the document whose primary key is `key`.
    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        doc: &Value,
    ) -> Result<Value, CacheError>;

    /// Deletes every document matching `filter`, returning the count removed.
    async fn delete_many(&self, collection: Collection, filter: &Filter)
        -> Result<u64, CacheError>;
}

/// Produces live [`DurableStore`] connections for a [`DurablePool`].
#[async_trait]
pub trait DurableConnector: Send + Sync + Debug {
    async fn connect(&self) -> Result<Arc<dyn DurableStore>, CacheError>;
}

#[derive(Default)]
struct PoolSlot {
    store: Option<Arc<dyn DurableStore>>,
    last_failure: Option<Instant>,
}

/// An explicit, shareable handle on the Durable Store connection.
///
/// Connects once and reuses the connection until it is invalidated by a connectivity
/// failure, after which the next [`DurablePool::get`] reconnects. After a failed connect,
/// further attempts are refused until the cooldown elapses, so an outage does not turn
/// every request into a slow connect attempt.
#[derive(Clone)]
pub struct DurablePool {
    connector: Option<Arc<dyn DurableConnector>>,
    slot: Arc<Mutex<PoolSlot>>,
    timeout: Duration,
    scan_timeout: Duration,
    reconnect_cooldown: Duration,
}

impl DurablePool {
    pub fn new(connector: Arc<dyn DurableConnector>, timeout: Duration) -> Self {
        Self {
            connector: Some(connector),
            slot: Arc::new(Mutex::new(PoolSlot::default())),
            timeout,
            scan_timeout: timeout * SCAN_TIMEOUT_FACTOR,
            reconnect_cooldown: Duration::from_secs(10),
        }
    }

    /// A pool with no Durable Store configured. Every `get` is a connectivity failure.
    pub fn disabled() -> Self {
        let timeout = Duration::from_secs(crate::constants::DEFAULT_TIMEOUT_SECS);
        Self {
            connector: None,
            slot: Arc::new(Mutex::new(PoolSlot::default())),
            timeout,
            scan_timeout: timeout * SCAN_TIMEOUT_FACTOR,
            reconnect_cooldown: Duration::ZERO,
        }
    }

    /// Overrides the bound on full-collection scans.
    pub fn with_scan_timeout(mut self, scan_timeout: Duration) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }

    pub fn with_reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.reconnect_cooldown = cooldown;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.connector.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }

    /// Connects eagerly, bypassing the reconnect cooldown.
    pub async fn open(&self) -> Result<(), CacheError> {
        let mut slot = self.slot.lock().await;
        slot.last_failure = None;
        self.connect_into(&mut slot).await.map(|_| ())
    }

    /// Returns a handle on the live connection, connecting first if needed.
    pub async fn get(&self) -> Result<DurableHandle, CacheError> {
        let mut slot = self.slot.lock().await;
        let store = match &slot.store {
            Some(store) => store.clone(),
            None => {
                if let Some(failed_at) = slot.last_failure {
                    if failed_at.elapsed() < self.reconnect_cooldown {
                        return Err(CacheError::Connectivity(
                            "durable store recently unreachable; waiting before reconnecting"
                                .to_string(),
                        ));
                    }
                }
                self.connect_into(&mut slot).await?
            }
        };
        Ok(DurableHandle {
            store,
            pool: self.clone(),
        })
    }

    async fn connect_into(
        &self,
        slot: &mut PoolSlot,
    ) -> Result<Arc<dyn DurableStore>, CacheError> {
        let Some(connector) = &self.connector else {
            return Err(CacheError::Connectivity(
                "durable store is not configured".to_string(),
            ));
        };
        let attempt = async {
            let store = connector.connect().await?;
            store.ping().await?;
            Ok::<_, CacheError>(store)
        };
        let result = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Connectivity(format!(
                "connecting to the durable store timed out after {:?}",
                self.timeout
            ))),
        };
        match result {
            Ok(store) => {
                info!("Connected to the durable store.");
                slot.store = Some(store.clone());
                slot.last_failure = None;
                Ok(store)
            }
            Err(e) => {
                warn!(error = %e, "Durable store connection failed.");
                slot.store = None;
                slot.last_failure = Some(Instant::now());
                Err(e)
            }
        }
    }

    /// Drops the cached connection. The next `get` reconnects.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.store.take().is_some() {
            warn!("Durable store connection invalidated.");
        }
    }

    /// Releases the connection. The pool can be reopened with [`DurablePool::open`].
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        slot.store = None;
        slot.last_failure = None;
        info!("Durable store pool closed.");
    }
}

impl Debug for DurablePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurablePool")
            .field("configured", &self.connector.is_some())
            .field("timeout", &self.timeout)
            .field("scan_timeout", &self.scan_timeout)
            .finish_non_exhaustive()
    }
}

/// A live connection borrowed from a [`DurablePool`].
///
/// Every call is bounded by the pool timeout, or the scan timeout for [`DurableHandle::find`].
/// A timeout or connectivity failure invalidates the pooled connection.
#[derive(Clone, Debug)]
pub struct DurableHandle {
    store: Arc<dyn DurableStore>,
    pool: DurablePool,
}

impl DurableHandle {
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = Result<T, CacheError>>,
    {
        self.bounded_by(op, self.pool.timeout, fut).await
    }

    async fn bounded_by<T, F>(&self, op: &str, limit: Duration, fut: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = Result<T, CacheError>>,
    {
        let result = match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Connectivity(format!(
                "durable {op} timed out after {limit:?}"
            ))),
        };
        if let Err(e) = &result {
            if e.is_connectivity() {
                self.pool.invalidate().await;
            }
        }
        result
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.bounded("ping", self.store.ping()).await
    }

    /// Every matching document. Used for whole-collection reads, so it runs under the scan timeout.
    pub async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Value>, CacheError> {
        self.bounded_by(
            "find",
            self.pool.scan_timeout,
            self.store.find(collection, filter),
        )
        .await
    }

    pub async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Value>, CacheError> {
        self.bounded("find_one", self.store.find_one(collection, filter))
            .await
    }

    pub async fn find_latest(
        &self,
        collection: Collection,
        filter: &Filter,
        sort_field: &str,
        limit: usize,
    ) -> Result<Vec<Value>, CacheError> {
        self.bounded(
            "find_latest",
            self.store.find_latest(collection, filter, sort_field, limit),
        )
        .await
    }

    pub async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        doc: &Value,
    ) -> Result<Value, CacheError> {
        self.bounded("upsert", self.store.upsert(collection, key, doc))
            .await
    }

    pub async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, CacheError> {
        self.bounded("delete_many", self.store.delete_many(collection, filter))
            .await
    }

    /// Typed access to the three collections.
    pub fn records(&self) -> DurableRecords<'_> {
        DurableRecords::new(self)
    }
}
