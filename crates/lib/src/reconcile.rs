//! # Reconciler
//!
//! Bidirectional batch synchronization between the two stores, always pull before push.
//!
//! Phase 1 replaces each Embedded Store table with the Durable Store's collection in one
//! transaction per table (upsert everything fetched, prune everything absent). An empty
//! remote collection empties the local table; a collection whose fetch or replace fails is
//! left untouched. Phase 2 upserts every local record into the Durable Store, except guest
//! chats, for the collections whose pull succeeded. A collection that was not pulled is not
//! pushed either, since its local table may still hold records the Durable Store deleted.
//! Nothing is ever deleted remotely.
//!
//! Per-record failures are collected in [`ReconcileReport::errors`] and never stop the batch.

use crate::{
    errors::CacheError,
    providers::db::{
        durable::{DecodedBatch, DurableHandle, DurablePool},
        sqlite::{EmbeddedStore, ReplaceCounts},
    },
    types::{ChatRecord, FactCheckEntry, User},
};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Counts for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    /// Records fetched from the Durable Store and upserted locally.
    pub pulled: usize,
    /// Local records deleted because the Durable Store no longer has them.
    pub pruned: usize,
    /// Local records upserted into the Durable Store.
    pub pushed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerCollection {
    pub users: CollectionReport,
    pub facts: CollectionReport,
    pub chats: CollectionReport,
}

/// The JSON-serializable result of [`Reconciler::reconcile_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub per_collection: PerCollection,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    embedded: EmbeddedStore,
    durable: DurablePool,
}

impl Reconciler {
    pub fn new(embedded: EmbeddedStore, durable: DurablePool) -> Self {
        Self { embedded, durable }
    }

    /// Runs both phases. Never fails: problems are reported in the result.
    ///
    /// Running it twice with no intervening writes leaves both stores unchanged the second time.
    pub async fn reconcile_all(&self) -> ReconcileReport {
        let started = Instant::now();
        let mut report = ReconcileReport::default();

        let handle = match self.durable.get().await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(component = "reconciler", error = %e, "Durable store unavailable; reconciliation skipped.");
                report.errors.push(format!("durable store unavailable: {e}"));
                report.duration_ms = elapsed_ms(started);
                return report;
            }
        };

        info!("Reconciliation phase 1: durable -> embedded.");
        let users_pulled = self.pull_users(&handle, &mut report).await;
        let facts_pulled = self.pull_facts(&handle, &mut report).await;
        let chats_pulled = self.pull_chats(&handle, &mut report).await;

        info!("Reconciliation phase 2: embedded -> durable.");
        if users_pulled {
            self.push_users(&handle, &mut report).await;
        } else {
            push_skipped("users");
        }
        if chats_pulled {
            self.push_chats(&handle, &mut report).await;
        } else {
            push_skipped("chats");
        }
        if facts_pulled {
            self.push_facts(&handle, &mut report).await;
        } else {
            push_skipped("facts");
        }

        report.duration_ms = elapsed_ms(started);
        info!(
            users = ?report.per_collection.users,
            facts = ?report.per_collection.facts,
            chats = ?report.per_collection.chats,
            errors = report.errors.len(),
            "Reconciliation finished."
        );
        report
    }

    // --- phase 1 ---
    // Each pull reports whether the local table now mirrors the remote collection.

    async fn pull_users(&self, handle: &DurableHandle, report: &mut ReconcileReport) -> bool {
        let Some(batch) = fetched("users", handle.records().list_users().await, report) else {
            return false;
        };
        let result = self.embedded.replace_users(&batch).await;
        apply_pull("users", result, &mut report.per_collection.users, &mut report.errors)
    }

    async fn pull_facts(&self, handle: &DurableHandle, report: &mut ReconcileReport) -> bool {
        let Some(batch) = fetched("facts", handle.records().list_facts().await, report) else {
            return false;
        };
        let result = self.embedded.replace_facts(&batch).await;
        apply_pull("facts", result, &mut report.per_collection.facts, &mut report.errors)
    }

    async fn pull_chats(&self, handle: &DurableHandle, report: &mut ReconcileReport) -> bool {
        let Some(batch) = fetched("chats", handle.records().list_chats().await, report) else {
            return false;
        };
        let result = self.embedded.replace_chats(&batch).await;
        apply_pull("chats", result, &mut report.per_collection.chats, &mut report.errors)
    }

    // --- phase 2 ---

    async fn push_users(&self, handle: &DurableHandle, report: &mut ReconcileReport) {
        let users: Vec<User> = match self.embedded.list_users().await {
            Ok(users) => users,
            Err(e) => return local_read_failed("users", e, report),
        };
        let records = handle.records();
        for user in &users {
            match records.upsert_user(user).await {
                Ok(()) => report.per_collection.users.pushed += 1,
                Err(e) => push_failed("user", &user.id, e, report),
            }
        }
    }

    async fn push_chats(&self, handle: &DurableHandle, report: &mut ReconcileReport) {
        let chats: Vec<ChatRecord> = match self.embedded.list_chats().await {
            Ok(chats) => chats,
            Err(e) => return local_read_failed("chats", e, report),
        };
        let records = handle.records();
        for chat in chats.iter().filter(|c| !c.is_guest()) {
            match records.upsert_chat(chat).await {
                Ok(()) => report.per_collection.chats.pushed += 1,
                Err(e) => push_failed("chat", &chat.id, e, report),
            }
        }
    }

    async fn push_facts(&self, handle: &DurableHandle, report: &mut ReconcileReport) {
        let facts: Vec<FactCheckEntry> = match self.embedded.list_facts().await {
            Ok(facts) => facts,
            Err(e) => return local_read_failed("facts", e, report),
        };
        let records = handle.records();
        for fact in &facts {
            match records.upsert_fact(fact).await {
                Ok(()) => report.per_collection.facts.pushed += 1,
                Err(e) => push_failed("fact", &fact.query, e, report),
            }
        }
    }
}

/// Unwraps a fetched collection, recording malformed documents. `None` when the fetch failed.
fn fetched<T>(
    collection: &str,
    result: Result<DecodedBatch<T>, CacheError>,
    report: &mut ReconcileReport,
) -> Option<Vec<T>> {
    match result {
        Ok(batch) => {
            report.errors.extend(batch.rejected);
            Some(batch.records)
        }
        Err(e) => {
            warn!(component = "reconciler", collection = %collection, error = %e, "Fetch failed; collection not pulled.");
            report.errors.push(format!("pull {collection}: {e}"));
            None
        }
    }
}

fn apply_pull(
    collection: &str,
    result: Result<ReplaceCounts, CacheError>,
    counts: &mut CollectionReport,
    errors: &mut Vec<String>,
) -> bool {
    match result {
        Ok(replaced) => {
            counts.pulled = replaced.upserted;
            counts.pruned = replaced.pruned;
            info!(collection = %collection, pulled = replaced.upserted, pruned = replaced.pruned, "Pulled collection.");
            true
        }
        Err(e) => {
            warn!(component = "reconciler", collection = %collection, error = %e, "Local replace failed; rolled back.");
            errors.push(format!("pull {collection}: {e}"));
            false
        }
    }
}

fn push_skipped(collection: &str) {
    warn!(component = "reconciler", collection = %collection, "Pull did not complete; collection not pushed.");
}

fn local_read_failed(collection: &str, e: CacheError, report: &mut ReconcileReport) {
    warn!(component = "reconciler", collection = %collection, error = %e, "Local read failed; collection not pushed.");
    report.errors.push(format!("push {collection}: {e}"));
}

fn push_failed(kind: &str, key: &str, e: CacheError, report: &mut ReconcileReport) {
    warn!(component = "reconciler", kind = %kind, key = %key, error = %e, "Failed to push record.");
    report.errors.push(format!("push {kind} {key}: {e}"));
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
