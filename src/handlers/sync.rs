//! # Manual Sync Handler
//!
//! Triggers a synchronous review sync batch for the authenticated
//! account and returns the aggregated result.

use axum::{extract::State, response::Json};

use crate::auth::{AccountExtension, AccountHeader, OperatorAuth};
use crate::error::ApiError;
use crate::orchestrator::BatchResult;
use crate::server::AppState;

/// Runs a review sync across the account's active locations
#[utoipa::path(
    post,
    path = "/sync/reviews",
    security(("bearer_auth" = [])),
    params(AccountHeader),
    responses(
        (status = 200, description = "Aggregated batch result", body = BatchResult, example = json!({
            "runId": "550e8400-e29b-41d4-a716-446655440000",
            "status": "success",
            "locationsCount": 2,
            "locationsFailed": 0,
            "reviewsCount": 14,
            "inserted": 3,
            "updated": 1,
            "skipped": 10,
            "locationResults": []
        })),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Batch could not start", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
) -> Result<Json<BatchResult>, ApiError> {
    let batch = state.orchestrator.sync_batch(account.0, "manual").await?;
    Ok(Json(batch))
}
