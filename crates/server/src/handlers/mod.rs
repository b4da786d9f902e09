//! # API Route Handlers
//!
//! This module organizes all the Axum route handlers for the `axiant-server`.
//! The handlers are split into logical sub-modules based on their functionality.

pub mod accounts;
pub mod chats;
pub mod facts;
pub mod general;
pub mod sync;

// Re-export all handlers so the router can reach them under a single `handlers::` path.
pub use accounts::*;
pub use chats::*;
pub use facts::*;
pub use general::*;
pub use sync::*;

// Shared items used by multiple handler modules.
use super::{errors::AppError, state::AppState};
use axiant::{types::SideWrite, Outcome};
use tracing::debug;

/// Logs the side-writes of an operation and hands back its value.
pub(crate) fn settle<T>(outcome: Outcome<T>, operation: &str) -> T {
    for side_write in &outcome.side_writes {
        match side_write {
            SideWrite::Failed { target, error } => {
                debug!(operation = %operation, store = ?target, error = %error, "Side-write failed.")
            }
            other => debug!(operation = %operation, side_write = ?other, "Side-write."),
        }
    }
    outcome.value
}
