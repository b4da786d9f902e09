use crate::{
    constants::GUEST_OWNER_ID,
    errors::CacheError,
    keys::normalize_query,
    types::{ChatRecord, FactCheckEntry, OriginProvider, User, VerdictLabel},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::{
    collections::HashSet,
    fmt::{self, Debug},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use turso::{Connection, Database, Row, Value as TursoValue};

mod sql;

/// Counts produced by a bulk replace of one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceCounts {
    pub upserted: usize,
    pub pruned: usize,
}

/// The Embedded Store: a local SQLite file accessed through Turso.
///
/// Holds three tables (`users`, `user_chats`, `fact_cache`). When cloned, it shares the
/// same underlying database, so one handle opened at startup serves the whole process.
/// Writes are serialized through a shared lock and every multi-statement write runs
/// inside a single transaction.
#[derive(Clone)]
pub struct EmbeddedStore {
    /// The Turso database instance. It's cloneable and thread-safe.
    pub db: Database,
    write_lock: Arc<Mutex<()>>,
}

impl EmbeddedStore {
    /// Opens the store at `db_path` and ensures the schema exists.
    ///
    /// Use ":memory:" for an isolated in-memory database; clone the handle to share it.
    pub async fn open(db_path: &str) -> Result<Self, CacheError> {
        let db = turso::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))?;

        let conn = db.connect()?;
        // Use `query` for PRAGMA statements that return a value to avoid "unexpected row" errors.
        conn.query("PRAGMA journal_mode=WAL;", ()).await?;

        let store = Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.initialize_schema().await?;
        info!(path = %db_path, "Embedded store ready.");
        Ok(store)
    }

    /// Ensures that all tables and indexes exist. Idempotent.
    pub async fn initialize_schema(&self) -> Result<(), CacheError> {
        let conn = self.db.connect()?;
        for statement in sql::ALL_TABLE_CREATION_SQL {
            conn.execute(statement, ()).await?;
        }
        Ok(())
    }

    /// Opens a connection and starts a transaction on it.
    ///
    /// Callers hold the write lock for the lifetime of the transaction.
    async fn begin(&self) -> Result<Connection, CacheError> {
        let conn = self.db.connect()?;
        conn.execute("BEGIN", ()).await?;
        Ok(conn)
    }

    // --- users ---

    /// Inserts or replaces a user by id.
    pub async fn upsert_user(&self, user: &User) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.begin().await?;
        let result = write_user(&conn, user).await;
        finish(&conn, result).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CacheError> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                &sql::select_user_where("email = ?1"),
                vec![text_value(email)],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, CacheError> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(&sql::select_user_where("id = ?1"), vec![text_value(id)])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, CacheError> {
        let conn = self.db.connect()?;
        let mut rows = conn.query(&sql::select_all_users(), ()).await?;
        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(user_from_row(&row)?);
        }
        Ok(users)
    }

    /// Upserts every user in `users` and deletes every local user absent from it,
    /// all in one transaction.
    pub async fn replace_users(&self, users: &[User]) -> Result<ReplaceCounts, CacheError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.begin().await?;
        let result = replace_users_in(&conn, users).await;
        finish(&conn, result).await
    }

    // --- user_chats ---

    /// Inserts or replaces a chat record by id. The lookup key is derived from its claim text.
    pub async fn upsert_chat(&self, chat: &ChatRecord) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.begin().await?;
        let result = write_chat(&conn, chat).await;
        finish(&conn, result).await
    }

    /// Finds the newest chat owned by `owner_id` whose normalized claim text equals `key`.
    pub async fn find_chat_by_text(
        &self,
        key: &str,
        owner_id: &str,
    ) -> Result<Option<ChatRecord>, CacheError> {
        let sql = sql::select_chat_where(
            "lookup_key = ?1 AND owner_id = ?2 ORDER BY created_at DESC LIMIT 1",
        );
        self.first_chat(&sql, vec![text_value(&normalize_query(key)), text_value(owner_id)])
            .await
    }

    /// Finds the newest chat owned by `owner_id` for an image content hash.
    pub async fn find_chat_by_image_hash(
        &self,
        image_hash: &str,
        owner_id: &str,
    ) -> Result<Option<ChatRecord>, CacheError> {
        let sql = sql::select_chat_where(
            "image_hash = ?1 AND owner_id = ?2 ORDER BY created_at DESC LIMIT 1",
        );
        self.first_chat(&sql, vec![text_value(image_hash), text_value(owner_id)])
            .await
    }

    async fn first_chat(
        &self,
        sql: &str,
        params: Vec<TursoValue>,
    ) -> Result<Option<ChatRecord>, CacheError> {
        let conn = self.db.connect()?;
        let mut rows = conn.query(sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(chat_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// The newest `limit` chats of one owner, newest first.
    pub async fn chat_history(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatRecord>, CacheError> {
        let sql = sql::select_chat_where(&format!(
            "owner_id = ?1 ORDER BY created_at DESC LIMIT {limit}"
        ));
        let conn = self.db.connect()?;
        let mut rows = conn.query(&sql, vec![text_value(owner_id)]).await?;
        let mut chats = Vec::new();
        while let Some(row) = rows.next().await? {
            chats.push(chat_from_row(&row)?);
        }
        Ok(chats)
    }

    /// Deletes one chat if it belongs to `owner_id`. Returns whether a row was removed.
    pub async fn delete_chat(&self, id: &str, owner_id: &str) -> Result<bool, CacheError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.db.connect()?;
        let affected = conn
            .execute(
                sql::DELETE_CHAT_BY_ID_AND_OWNER,
                vec![text_value(id), text_value(owner_id)],
            )
            .await?;
        debug!(chat_id = %id, owner = %owner_id, affected, "Embedded chat delete.");
        Ok(affected > 0)
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatRecord>, CacheError> {
        let conn = self.db.connect()?;
        let mut rows = conn.query(&sql::select_all_chats(), ()).await?;
        let mut chats = Vec::new();
        while let Some(row) = rows.next().await? {
            chats.push(chat_from_row(&row)?);
        }
        Ok(chats)
    }

    /// Upserts every chat in `chats` and deletes every non-guest local chat absent from it,
    /// all in one transaction. Guest chats are never pruned.
    pub async fn replace_chats(&self, chats: &[ChatRecord]) -> Result<ReplaceCounts, CacheError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.begin().await?;
        let result = replace_chats_in(&conn, chats).await;
        finish(&conn, result).await
    }

    // --- fact_cache ---

    /// Inserts or replaces a fact-check entry. The key is normalized before writing.
    pub async fn upsert_fact(&self, entry: &FactCheckEntry) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.begin().await?;
        let result = write_fact(&conn, entry).await;
        finish(&conn, result).await
    }

    /// Looks up a fact-check entry. The query is normalized before keying.
    pub async fn find_fact(&self, query: &str) -> Result<Option<FactCheckEntry>, CacheError> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                &sql::select_fact_by_query(),
                vec![text_value(&normalize_query(query))],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(fact_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_facts(&self) -> Result<Vec<FactCheckEntry>, CacheError> {
        let conn = self.db.connect()?;
        let mut rows = conn.query(&sql::select_all_facts(), ()).await?;
        let mut facts = Vec::new();
        while let Some(row) = rows.next().await? {
            facts.push(fact_from_row(&row)?);
        }
        Ok(facts)
    }

    /// Upserts every entry in `facts` and deletes every local entry absent from it,
    /// all in one transaction.
    pub async fn replace_facts(
        &self,
        facts: &[FactCheckEntry],
    ) -> Result<ReplaceCounts, CacheError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.begin().await?;
        let result = replace_facts_in(&conn, facts).await;
        finish(&conn, result).await
    }
}

impl Debug for EmbeddedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedStore").finish_non_exhaustive()
    }
}

impl AsRef<Database> for EmbeddedStore {
    fn as_ref(&self) -> &Database {
        &self.db
    }
}

// --- statement helpers ---

/// Commits on success, rolls back on failure.
async fn finish<T>(conn: &Connection, result: Result<T, CacheError>) -> Result<T, CacheError> {
    match result {
        Ok(value) => {
            conn.execute("COMMIT", ()).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = conn.execute("ROLLBACK", ()).await {
                warn!(error = %rollback_err, "Embedded store rollback failed.");
            }
            Err(e)
        }
    }
}

async fn replace_users_in(conn: &Connection, users: &[User]) -> Result<ReplaceCounts, CacheError> {
    let keep: HashSet<&str> = users.iter().map(|u| u.id.as_str()).collect();
    let existing = collect_keys(conn, sql::SELECT_USER_IDS, vec![]).await?;
    let mut counts = ReplaceCounts::default();
    // Prune first so that a remote user reusing a stale local email can be inserted.
    for id in existing.iter().filter(|id| !keep.contains(id.as_str())) {
        conn.execute(sql::DELETE_USER_BY_ID, vec![text_value(id)])
            .await?;
        counts.pruned += 1;
    }
    for user in users {
        write_user(conn, user).await?;
        counts.upserted += 1;
    }
    Ok(counts)
}

async fn replace_chats_in(
    conn: &Connection,
    chats: &[ChatRecord],
) -> Result<ReplaceCounts, CacheError> {
    let mut counts = ReplaceCounts::default();
    for chat in chats {
        write_chat(conn, chat).await?;
        counts.upserted += 1;
    }
    let keep: HashSet<&str> = chats.iter().map(|c| c.id.as_str()).collect();
    let existing = collect_keys(
        conn,
        sql::SELECT_SYNCABLE_CHAT_IDS,
        vec![text_value(GUEST_OWNER_ID)],
    )
    .await?;
    for id in existing.iter().filter(|id| !keep.contains(id.as_str())) {
        conn.execute(sql::DELETE_CHAT_BY_ID, vec![text_value(id)])
            .await?;
        counts.pruned += 1;
    }
    Ok(counts)
}

async fn replace_facts_in(
    conn: &Connection,
    facts: &[FactCheckEntry],
) -> Result<ReplaceCounts, CacheError> {
    let mut counts = ReplaceCounts::default();
    let mut keep = HashSet::new();
    for fact in facts {
        write_fact(conn, fact).await?;
        keep.insert(normalize_query(&fact.query));
        counts.upserted += 1;
    }
    let existing = collect_keys(conn, sql::SELECT_FACT_KEYS, vec![]).await?;
    for key in existing.iter().filter(|k| !keep.contains(*k)) {
        conn.execute(sql::DELETE_FACT_BY_QUERY, vec![text_value(key)])
            .await?;
        counts.pruned += 1;
    }
    Ok(counts)
}

async fn write_user(conn: &Connection, user: &User) -> Result<(), CacheError> {
    conn.execute(
        sql::DELETE_USER_EMAIL_CLASH,
        vec![text_value(&user.email), text_value(&user.id)],
    )
    .await?;
    conn.execute(
        sql::UPSERT_USER,
        vec![
            text_value(&user.id),
            text_value(&user.username),
            text_value(&user.email),
            text_value(&user.password_digest),
            TursoValue::Integer(i64::from(user.is_verified)),
            opt_text_value(user.otp.as_deref()),
            opt_time_value(user.otp_expires_at),
            opt_text_value(user.reset_token.as_deref()),
            opt_time_value(user.reset_token_expires_at),
            time_value(user.created_at),
        ],
    )
    .await?;
    Ok(())
}

async fn write_chat(conn: &Connection, chat: &ChatRecord) -> Result<(), CacheError> {
    let fact_check = match &chat.fact_check {
        Some(entry) => TursoValue::Text(serde_json::to_string(entry)?),
        None => TursoValue::Null,
    };
    conn.execute(
        sql::UPSERT_CHAT,
        vec![
            text_value(&chat.id),
            text_value(&chat.owner_id),
            text_value(&chat.claim_text),
            text_value(&normalize_query(&chat.claim_text)),
            opt_text_value(chat.image_base64.as_deref()),
            opt_text_value(chat.image_hash.as_deref()),
            text_value(chat.verdict_label.as_str()),
            TursoValue::Integer(i64::from(chat.confidence_score)),
            text_value(&chat.reason_text),
            fact_check,
            time_value(chat.created_at),
        ],
    )
    .await?;
    Ok(())
}

async fn write_fact(conn: &Connection, entry: &FactCheckEntry) -> Result<(), CacheError> {
    let key = normalize_query(&entry.query);
    if key.is_empty() {
        return Err(CacheError::Validation(
            "fact-check entry has an empty query".to_string(),
        ));
    }
    conn.execute(
        sql::UPSERT_FACT,
        vec![
            text_value(&key),
            text_value(&entry.claim_text),
            text_value(&entry.claimant),
            text_value(&entry.rating),
            text_value(&entry.publisher),
            text_value(&entry.date),
            text_value(&entry.url),
            text_value(entry.origin_provider.as_str()),
            time_value(entry.created_at),
        ],
    )
    .await?;
    Ok(())
}

async fn collect_keys(
    conn: &Connection,
    sql: &str,
    params: Vec<TursoValue>,
) -> Result<Vec<String>, CacheError> {
    let mut rows = conn.query(sql, params).await?;
    let mut keys = Vec::new();
    while let Some(row) = rows.next().await? {
        keys.push(text_at(&row, 0)?);
    }
    Ok(keys)
}

fn text_value(s: &str) -> TursoValue {
    TursoValue::Text(s.to_string())
}

fn opt_text_value(s: Option<&str>) -> TursoValue {
    s.map(text_value).unwrap_or(TursoValue::Null)
}

fn time_value(t: DateTime<Utc>) -> TursoValue {
    TursoValue::Text(t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn opt_time_value(t: Option<DateTime<Utc>>) -> TursoValue {
    t.map(time_value).unwrap_or(TursoValue::Null)
}

// --- row decoding ---

fn text_at(row: &Row, idx: usize) -> Result<String, CacheError> {
    Ok(opt_text_at(row, idx)?.unwrap_or_default())
}

fn opt_text_at(row: &Row, idx: usize) -> Result<Option<String>, CacheError> {
    match row.get_value(idx)? {
        TursoValue::Null => Ok(None),
        TursoValue::Text(s) => Ok(Some(s)),
        TursoValue::Integer(i) => Ok(Some(i.to_string())),
        TursoValue::Real(f) => Ok(Some(f.to_string())),
        TursoValue::Blob(_) => Err(CacheError::Storage(format!(
            "unexpected blob in text column {idx}"
        ))),
    }
}

fn int_at(row: &Row, idx: usize) -> Result<i64, CacheError> {
    match row.get_value(idx)? {
        TursoValue::Integer(i) => Ok(i),
        TursoValue::Real(f) => Ok(f as i64),
        TursoValue::Null => Ok(0),
        other => Err(CacheError::Storage(format!(
            "expected integer in column {idx}, found {other:?}"
        ))),
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CacheError::Storage(format!("bad timestamp '{raw}': {e}")))
}

fn opt_time_at(row: &Row, idx: usize) -> Result<Option<DateTime<Utc>>, CacheError> {
    opt_text_at(row, idx)?
        .map(|raw| parse_time(&raw))
        .transpose()
}

fn user_from_row(row: &Row) -> Result<User, CacheError> {
    Ok(User {
        id: text_at(row, 0)?,
        username: text_at(row, 1)?,
        email: text_at(row, 2)?,
        password_digest: text_at(row, 3)?,
        is_verified: int_at(row, 4)? != 0,
        otp: opt_text_at(row, 5)?,
        otp_expires_at: opt_time_at(row, 6)?,
        reset_token: opt_text_at(row, 7)?,
        reset_token_expires_at: opt_time_at(row, 8)?,
        created_at: parse_time(&text_at(row, 9)?)?,
    })
}

fn chat_from_row(row: &Row) -> Result<ChatRecord, CacheError> {
    let fact_check = match opt_text_at(row, 8)? {
        Some(raw) => Some(serde_json::from_str::<FactCheckEntry>(&raw)?),
        None => None,
    };
    Ok(ChatRecord {
        id: text_at(row, 0)?,
        owner_id: text_at(row, 1)?,
        claim_text: text_at(row, 2)?,
        image_base64: opt_text_at(row, 3)?,
        image_hash: opt_text_at(row, 4)?,
        verdict_label: VerdictLabel::from_stored(&text_at(row, 5)?),
        confidence_score: int_at(row, 6)?.clamp(0, 100) as u8,
        reason_text: text_at(row, 7)?,
        fact_check,
        created_at: parse_time(&text_at(row, 9)?)?,
    })
}

fn fact_from_row(row: &Row) -> Result<FactCheckEntry, CacheError> {
    Ok(FactCheckEntry {
        query: text_at(row, 0)?,
        claim_text: text_at(row, 1)?,
        claimant: text_at(row, 2)?,
        rating: text_at(row, 3)?,
        publisher: text_at(row, 4)?,
        date: text_at(row, 5)?,
        url: text_at(row, 6)?,
        origin_provider: OriginProvider::from(text_at(row, 7)?),
        created_at: parse_time(&text_at(row, 8)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn chat(id: &str, owner: &str, text: &str, age_secs: i64) -> ChatRecord {
        ChatRecord {
            id: id.to_string(),
            owner_id: owner.to_string(),
            claim_text: text.to_string(),
            image_base64: None,
            image_hash: None,
            verdict_label: VerdictLabel::False,
            confidence_score: 90,
            reason_text: "Debunked.".to_string(),
            fact_check: None,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    fn fact(query: &str) -> FactCheckEntry {
        FactCheckEntry {
            query: query.to_string(),
            claim_text: query.to_string(),
            claimant: "Someone".to_string(),
            rating: "False".to_string(),
            publisher: "Snopes".to_string(),
            date: "2024-01-01".to_string(),
            url: "https://example.org".to_string(),
            origin_provider: OriginProvider::Google,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn chat_lookup_is_normalized_and_owner_scoped() {
        let store = EmbeddedStore::open(":memory:").await.unwrap();
        store
            .upsert_chat(&chat("c1", "alice", "Earth Is Flat", 0))
            .await
            .unwrap();

        let hit = store
            .find_chat_by_text("  earth is FLAT ", "alice")
            .await
            .unwrap();
        assert_eq!(hit.map(|c| c.id), Some("c1".to_string()));
        assert!(store
            .find_chat_by_text("earth is flat", "bob")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn upserting_twice_keeps_one_row() {
        let store = EmbeddedStore::open(":memory:").await.unwrap();
        let mut entry = fact("moon landing was faked");
        store.upsert_fact(&entry).await.unwrap();
        entry.rating = "Pants on Fire".to_string();
        store.upsert_fact(&entry).await.unwrap();

        let facts = store.list_facts().await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].rating, "Pants on Fire");
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let store = EmbeddedStore::open(":memory:").await.unwrap();
        for i in 0..5 {
            store
                .upsert_chat(&chat(&format!("c{i}"), "alice", "claim", 100 - i))
                .await
                .unwrap();
        }
        let history = store.chat_history("alice", 3).await.unwrap();
        let ids: Vec<_> = history.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c4", "c3", "c2"]);
    }

    #[tokio::test]
    async fn delete_chat_requires_owner() {
        let store = EmbeddedStore::open(":memory:").await.unwrap();
        store.upsert_chat(&chat("c1", "alice", "x", 0)).await.unwrap();
        assert!(!store.delete_chat("c1", "bob").await.unwrap());
        assert!(store.delete_chat("c1", "alice").await.unwrap());
        assert!(store.list_chats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_chats_prunes_absent_but_keeps_guest_chats() {
        let store = EmbeddedStore::open(":memory:").await.unwrap();
        store.upsert_chat(&chat("stale", "alice", "a", 0)).await.unwrap();
        store
            .upsert_chat(&chat("local", GUEST_OWNER_ID, "b", 0))
            .await
            .unwrap();

        let counts = store
            .replace_chats(&[chat("remote", "alice", "c", 0)])
            .await
            .unwrap();
        assert_eq!(counts, ReplaceCounts { upserted: 1, pruned: 1 });

        let mut ids: Vec<_> = store
            .list_chats()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["local".to_string(), "remote".to_string()]);
    }

    #[tokio::test]
    async fn replace_facts_with_empty_set_clears_table() {
        let store = EmbeddedStore::open(":memory:").await.unwrap();
        store.upsert_fact(&fact("a")).await.unwrap();
        store.upsert_fact(&fact("b")).await.unwrap();
        let counts = store.replace_facts(&[]).await.unwrap();
        assert_eq!(counts.pruned, 2);
        assert!(store.list_facts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_round_trips_optional_fields() {
        let store = EmbeddedStore::open(":memory:").await.unwrap();
        let user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password_digest: "digest".to_string(),
            is_verified: false,
            otp: Some("123456".to_string()),
            otp_expires_at: Some(Utc::now()),
            reset_token: None,
            reset_token_expires_at: None,
            created_at: Utc::now(),
        };
        store.upsert_user(&user).await.unwrap();
        let loaded = store.find_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(loaded.otp.as_deref(), Some("123456"));
        assert!(loaded.otp_expires_at.is_some());
        assert!(!loaded.is_verified);
        assert!(store.find_user_by_id("nobody").await.unwrap().is_none());
    }
}
