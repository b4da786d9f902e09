// Maps the document contract onto MongoDB:
// - `id` field <-> `_id` field (ObjectId keys from existing data surface as hex strings)
// - BSON dates <-> RFC 3339 strings for the known timestamp fields
// - equality filters -> find filters

use super::{Collection, DurableConnector, DurableStore, Filter};
use crate::errors::CacheError;
use async_trait::async_trait;
use chrono::DateTime as ChronoDateTime;
use futures_util::StreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document},
    error::{Error as MongoError, ErrorKind},
    options::{ClientOptions, FindOptions},
    Client, Database,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Document fields stored as BSON dates.
const DATE_FIELDS: &[&str] = &["createdAt", "otpExpires", "resetTokenExpires"];

/// MongoDB implementation of [`DurableStore`].
#[derive(Debug, Clone)]
pub struct MongoDurableStore {
    db: Database,
}

impl MongoDurableStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<Document> {
        self.db.collection(collection.name())
    }
}

/// Classifies a driver error: unreachable servers are `Connectivity`, the rest `Durable`.
fn map_mongo_error(err: MongoError) -> CacheError {
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => CacheError::Connectivity(err.to_string()),
        _ => CacheError::Durable(err.to_string()),
    }
}

/// The BSON value for a primary key: ObjectId when it parses as one, string otherwise.
fn key_to_bson(key: &str) -> Bson {
    match ObjectId::parse_str(key) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(key.to_string()),
    }
}

fn mongo_field(collection: Collection, field: &str) -> String {
    if field == "id" && collection.key_field() == "id" {
        "_id".to_string()
    } else {
        field.to_string()
    }
}

fn build_filter(collection: Collection, filter: &Filter) -> Document {
    let mut doc = Document::new();
    for (field, value) in filter {
        let key = mongo_field(collection, field);
        let bson = match (key.as_str(), value) {
            ("_id", Value::String(s)) => key_to_bson(s),
            _ => json_to_bson(field, value),
        };
        doc.insert(key, bson);
    }
    doc
}

/// Converts serde_json to BSON. Known timestamp fields become BSON dates.
pub fn json_to_bson(field: &str, v: &Value) -> Bson {
    match v {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else if let Some(f) = n.as_f64() {
                Bson::Double(f)
            } else {
                Bson::String(n.to_string())
            }
        }
        Value::String(s) => {
            if DATE_FIELDS.contains(&field) {
                if let Ok(dt) = ChronoDateTime::parse_from_rfc3339(s) {
                    return Bson::DateTime(BsonDateTime::from_millis(dt.timestamp_millis()));
                }
            }
            Bson::String(s.clone())
        }
        Value::Array(arr) => Bson::Array(arr.iter().map(|v| json_to_bson(field, v)).collect()),
        Value::Object(map) => {
            let mut doc = Document::new();
            for (k, v) in map {
                doc.insert(k.clone(), json_to_bson(k, v));
            }
            Bson::Document(doc)
        }
    }
}

/// Converts BSON to serde_json.
pub fn bson_to_json(b: &Bson) -> Value {
    match b {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => serde_json::json!(*b),
        Bson::Int32(i) => serde_json::json!(*i),
        Bson::Int64(i) => serde_json::json!(*i),
        Bson::Double(f) => serde_json::json!(*f),
        Bson::String(s) => serde_json::json!(s),
        Bson::ObjectId(oid) => serde_json::json!(oid.to_hex()),
        Bson::Array(arr) => Value::Array(arr.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => doc_to_json(doc),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => serde_json::json!(dt.timestamp_millis()),
        },
        _ => Value::Null,
    }
}

/// Converts a MongoDB document to JSON, renaming `_id` to `id`.
pub fn doc_to_json(doc: &Document) -> Value {
    let mut map = serde_json::Map::new();
    for (k, v) in doc {
        let key = if k == "_id" { "id".to_string() } else { k.clone() };
        map.insert(key, bson_to_json(v));
    }
    Value::Object(map)
}

/// Builds the stored document for `key`.
///
/// For collections keyed by `id`, the key becomes `_id`. Fact checks keep their
/// driver-assigned `_id` and are matched on `query`, so an incoming `id` is dropped.
fn build_replacement(collection: Collection, key: &str, data: &Value) -> Document {
    let mut doc = Document::new();
    if collection.key_field() == "id" {
        doc.insert("_id", key_to_bson(key));
    }
    if let Some(obj) = data.as_object() {
        for (k, v) in obj {
            if k == "id" || k == "_id" {
                continue;
            }
            doc.insert(k.clone(), json_to_bson(k, v));
        }
    }
    if collection.key_field() != "id" {
        doc.insert(collection.key_field(), Bson::String(key.to_string()));
    }
    doc
}

fn key_filter(collection: Collection, key: &str) -> Document {
    if collection.key_field() == "id" {
        doc! { "_id": key_to_bson(key) }
    } else {
        doc! { collection.key_field(): key }
    }
}

#[async_trait]
impl DurableStore for MongoDurableStore {
    async fn ping(&self) -> Result<(), CacheError> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(map_mongo_error)?;
        Ok(())
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Value>, CacheError> {
        let mut cursor = self
            .collection(collection)
            .find(build_filter(collection, filter))
            .await
            .map_err(map_mongo_error)?;
        let mut results = Vec::new();
        while let Some(doc) = cursor.next().await {
            let doc = doc.map_err(map_mongo_error)?;
            results.push(doc_to_json(&doc));
        }
        Ok(results)
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Value>, CacheError> {
        let found = self
            .collection(collection)
            .find_one(build_filter(collection, filter))
            .await
            .map_err(map_mongo_error)?;
        Ok(found.map(|doc| doc_to_json(&doc)))
    }

    async fn find_latest(
        &self,
        collection: Collection,
        filter: &Filter,
        sort_field: &str,
        limit: usize,
    ) -> Result<Vec<Value>, CacheError> {
        let mut options = FindOptions::default();
        options.sort = Some(doc! { sort_field: -1 });
        options.limit = Some(limit as i64);
        let mut cursor = self
            .collection(collection)
            .find(build_filter(collection, filter))
            .with_options(options)
            .await
            .map_err(map_mongo_error)?;
        let mut results = Vec::new();
        while let Some(doc) = cursor.next().await {
            let doc = doc.map_err(map_mongo_error)?;
            results.push(doc_to_json(&doc));
        }
        Ok(results)
    }

    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        data: &Value,
    ) -> Result<Value, CacheError> {
        let replacement = build_replacement(collection, key, data);
        let result = self
            .collection(collection)
            .replace_one(key_filter(collection, key), replacement.clone())
            .upsert(true)
            .await
            .map_err(map_mongo_error)?;
        debug!(
            collection = %collection,
            key = %key,
            matched = result.matched_count,
            "Durable upsert applied."
        );
        Ok(doc_to_json(&replacement))
    }

    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, CacheError> {
        let result = self
            .collection(collection)
            .delete_many(build_filter(collection, filter))
            .await
            .map_err(map_mongo_error)?;
        Ok(result.deleted_count)
    }
}

/// Opens [`MongoDurableStore`] connections from a connection string.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    uri: String,
    database: String,
    timeout: Duration,
}

impl MongoConnector {
    pub fn new(uri: impl Into<String>, database: impl Into<String>, timeout: Duration) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DurableConnector for MongoConnector {
    async fn connect(&self) -> Result<Arc<dyn DurableStore>, CacheError> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(map_mongo_error)?;
        options.server_selection_timeout = Some(self.timeout);
        options.connect_timeout = Some(self.timeout);
        let client = Client::with_options(options).map_err(map_mongo_error)?;
        let db = match client.default_database() {
            Some(db) => db,
            None => client.database(&self.database),
        };
        Ok(Arc::new(MongoDurableStore::new(db)))
    }
}
