//! # Embedded Store SQL
//!
//! This module centralizes the SQL strings used by the Embedded Store.
//! Timestamps are stored as RFC 3339 text with millisecond precision, so that
//! lexical order matches chronological order.

pub const CREATE_USERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_digest TEXT NOT NULL,
    is_verified INTEGER NOT NULL DEFAULT 0,
    otp TEXT,
    otp_expires_at TEXT,
    reset_token TEXT,
    reset_token_expires_at TEXT,
    created_at TEXT NOT NULL
);";

pub const CREATE_USER_CHATS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS user_chats (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    claim_text TEXT NOT NULL,
    lookup_key TEXT NOT NULL,
    image_base64 TEXT,
    image_hash TEXT,
    verdict_label TEXT NOT NULL,
    confidence_score INTEGER NOT NULL,
    reason_text TEXT NOT NULL,
    fact_check TEXT,
    created_at TEXT NOT NULL
);";

pub const CREATE_CHATS_LOOKUP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_user_chats_lookup ON user_chats (lookup_key, owner_id);";

pub const CREATE_CHATS_IMAGE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_user_chats_image ON user_chats (image_hash, owner_id);";

pub const CREATE_FACT_CACHE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS fact_cache (
    query TEXT PRIMARY KEY,
    claim_text TEXT NOT NULL,
    claimant TEXT NOT NULL,
    rating TEXT NOT NULL,
    publisher TEXT NOT NULL,
    date TEXT NOT NULL,
    url TEXT NOT NULL,
    origin_provider TEXT NOT NULL,
    created_at TEXT NOT NULL
);";

pub const ALL_TABLE_CREATION_SQL: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_USER_CHATS_TABLE,
    CREATE_CHATS_LOOKUP_INDEX,
    CREATE_CHATS_IMAGE_INDEX,
    CREATE_FACT_CACHE_TABLE,
];

// --- users ---

const USER_COLUMNS: &str = "id, username, email, password_digest, is_verified, otp, otp_expires_at, reset_token, reset_token_expires_at, created_at";

pub fn select_user_where(condition: &str) -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE {condition}")
}

pub fn select_all_users() -> String {
    format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at")
}

/// Drops a stale local row that holds the same email under a different id.
pub const DELETE_USER_EMAIL_CLASH: &str = "DELETE FROM users WHERE email = ?1 AND id <> ?2";

pub const UPSERT_USER: &str = "
INSERT INTO users (id, username, email, password_digest, is_verified, otp, otp_expires_at, reset_token, reset_token_expires_at, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(id) DO UPDATE SET
    username = excluded.username,
    email = excluded.email,
    password_digest = excluded.password_digest,
    is_verified = excluded.is_verified,
    otp = excluded.otp,
    otp_expires_at = excluded.otp_expires_at,
    reset_token = excluded.reset_token,
    reset_token_expires_at = excluded.reset_token_expires_at,
    created_at = excluded.created_at";

pub const SELECT_USER_IDS: &str = "SELECT id FROM users";
pub const DELETE_USER_BY_ID: &str = "DELETE FROM users WHERE id = ?1";

// --- user_chats ---

const CHAT_COLUMNS: &str = "id, owner_id, claim_text, image_base64, image_hash, verdict_label, confidence_score, reason_text, fact_check, created_at";

pub fn select_chat_where(condition: &str) -> String {
    format!("SELECT {CHAT_COLUMNS} FROM user_chats WHERE {condition}")
}

pub fn select_all_chats() -> String {
    format!("SELECT {CHAT_COLUMNS} FROM user_chats ORDER BY created_at")
}

pub const UPSERT_CHAT: &str = "
INSERT INTO user_chats (id, owner_id, claim_text, lookup_key, image_base64, image_hash, verdict_label, confidence_score, reason_text, fact_check, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
ON CONFLICT(id) DO UPDATE SET
    owner_id = excluded.owner_id,
    claim_text = excluded.claim_text,
    lookup_key = excluded.lookup_key,
    image_base64 = excluded.image_base64,
    image_hash = excluded.image_hash,
    verdict_label = excluded.verdict_label,
    confidence_score = excluded.confidence_score,
    reason_text = excluded.reason_text,
    fact_check = excluded.fact_check,
    created_at = excluded.created_at";

/// Guest chats never reach the Durable Store, so they are outside the prune set.
pub const SELECT_SYNCABLE_CHAT_IDS: &str = "SELECT id FROM user_chats WHERE owner_id <> ?1";
pub const DELETE_CHAT_BY_ID: &str = "DELETE FROM user_chats WHERE id = ?1";
pub const DELETE_CHAT_BY_ID_AND_OWNER: &str =
    "DELETE FROM user_chats WHERE id = ?1 AND owner_id = ?2";

// --- fact_cache ---

const FACT_COLUMNS: &str =
    "query, claim_text, claimant, rating, publisher, date, url, origin_provider, created_at";

pub fn select_fact_by_query() -> String {
    format!("SELECT {FACT_COLUMNS} FROM fact_cache WHERE query = ?1")
}

pub fn select_all_facts() -> String {
    format!("SELECT {FACT_COLUMNS} FROM fact_cache ORDER BY created_at")
}

pub const UPSERT_FACT: &str = "
INSERT INTO fact_cache (query, claim_text, claimant, rating, publisher, date, url, origin_provider, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(query) DO UPDATE SET
    claim_text = excluded.claim_text,
    claimant = excluded.claimant,
    rating = excluded.rating,
    publisher = excluded.publisher,
    date = excluded.date,
    url = excluded.url,
    origin_provider = excluded.origin_provider,
    created_at = excluded.created_at";

pub const SELECT_FACT_KEYS: &str = "SELECT query FROM fact_cache";
pub const DELETE_FACT_BY_QUERY: &str = "DELETE FROM fact_cache WHERE query = ?1";
