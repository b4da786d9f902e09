//! # Reconciliation Handler

use super::AppState;
use axiant::ReconcileReport;
use axum::{extract::State, Json};
use tracing::info;

/// Runs one full reconciliation pass and returns its report.
///
/// Per-record failures are part of the report; the response is always `200`.
pub async fn sync_handler(State(app_state): State<AppState>) -> Json<ReconcileReport> {
    info!("Reconciliation requested over HTTP.");
    Json(app_state.core.reconciler.reconcile_all().await)
}
