//! # Shared Constants
//!
//! This module provides a centralized location for constants that are shared across
//! the crates of the `axiant` workspace.

/// The default path of the embedded store file, relative to the working directory.
pub const DEFAULT_DB_FILE: &str = "chat_cache.sqlite";

/// The reserved owner identifier for unauthenticated, local-only records.
pub const GUEST_OWNER_ID: &str = "guest";

/// Default bound, in seconds, for any call to the Durable Store or an external provider.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// How many chat records a history listing returns.
pub const HISTORY_LIMIT: u32 = 20;

/// Lifetime of a verification OTP or password-reset token, in minutes.
pub const CODE_TTL_MINUTES: i64 = 10;
