//! # Run History Handlers
//!
//! Read-only access to recorded sync runs for an account.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AccountExtension, AccountHeader, OperatorAuth};
use crate::error::ApiError;
use crate::server::AppState;

/// Query parameters for the run history listing
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct ListRunsQuery {
    /// Maximum number of runs to return (default: 20, max: 100)
    pub limit: Option<i64>,
}

/// Sync run information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncRunInfo {
    /// Unique identifier for the run
    #[schema(value_type = String)]
    pub id: Uuid,
    /// `manual` or `scheduled`
    pub run_type: String,
    /// `running`, `success`, `partial_failure`, or `failure`
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    /// Failure detail for runs that could not complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-location outcome breakdown recorded at close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl From<crate::models::sync_run::Model> for SyncRunInfo {
    fn from(model: crate::models::sync_run::Model) -> Self {
        let to_rfc3339 = |dt: chrono::DateTime<chrono::FixedOffset>| {
            let utc: DateTime<Utc> = dt.into();
            utc.to_rfc3339()
        };
        Self {
            id: model.id,
            run_type: model.run_type,
            status: model.status,
            started_at: to_rfc3339(model.started_at),
            finished_at: model.finished_at.map(to_rfc3339),
            error: model.error,
            metadata: model.metadata,
        }
    }
}

/// Response wrapper for the run history listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncRunsResponse {
    /// Recent runs for the account, newest first
    pub runs: Vec<SyncRunInfo>,
}

/// Lists recent sync runs for the authenticated account
#[utoipa::path(
    get,
    path = "/sync/runs",
    security(("bearer_auth" = [])),
    params(AccountHeader, ListRunsQuery),
    responses(
        (status = 200, description = "Recent sync runs", body = SyncRunsResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn list_runs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<SyncRunsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(20);
    if !(1..=100).contains(&limit) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "limit must be between 1 and 100",
        ));
    }

    let runs = state
        .runs
        .list_by_account(&account.0, limit as u64)
        .await?;

    Ok(Json(SyncRunsResponse {
        runs: runs.into_iter().map(SyncRunInfo::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sync_run::{Model, STATUS_SUCCESS};
    use chrono::Utc;

    #[test]
    fn run_info_serializes_timestamps_as_rfc3339() {
        let now = Utc::now();
        let model = Model {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            run_type: "manual".to_string(),
            status: STATUS_SUCCESS.to_string(),
            location_id: None,
            started_at: now.into(),
            finished_at: Some(now.into()),
            error: None,
            metadata: Some(serde_json::json!([])),
        };

        let info = SyncRunInfo::from(model);
        assert!(info.started_at.contains('T'));
        assert!(info.finished_at.is_some());

        let json = serde_json::to_value(&info).expect("serializes");
        assert!(json.get("error").is_none(), "absent error field is omitted");
        assert_eq!(json["status"], "success");
    }
}
