//! # Health Check Handler
//!
//! Liveness/readiness endpoint backed by a database round trip.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::server::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall status, `ok` when all checks pass
    #[schema(example = "ok")]
    pub status: String,
    /// Database connectivity check result
    #[schema(example = "ok")]
    pub database: String,
}

/// Reports service health including database connectivity
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = ApiError)
    ),
    tag = "health"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    match crate::db::health_check(&state.db).await {
        Ok(()) => Ok(Json(HealthResponse {
            status: "ok".to_string(),
            database: "ok".to_string(),
        })),
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed");
            Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "database unreachable",
            ))
        }
    }
}
