//! # Connection Status Handler
//!
//! Reports the normalized Google Business connection status for an
//! account. A degraded connection is expressed through the status
//! vocabulary; a missing connection row is a 404, which consumers
//! normalize to `disconnected/no_connection`.

use axum::http::StatusCode;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::auth::{AccountExtension, AccountHeader, OperatorAuth};
use crate::error::ApiError;
use crate::models::connection::Model as ConnectionModel;
use crate::server::AppState;
use crate::status::{self, ResolvedStatus};

/// Normalized connection state for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionState {
    /// `connected`, `disconnected`, `reauth_required`, or `unknown`
    #[schema(example = "connected")]
    pub status: String,
    /// Machine-readable reason accompanying the status
    #[schema(example = "ok")]
    pub reason: String,
    /// Last recorded provider error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Response wrapper for the connection status endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionStatusResponse {
    pub connection: ConnectionState,
}

/// Maps a stored connection row onto the probe vocabulary understood by
/// the resolver. Unrecognized stored statuses pass through untouched and
/// normalize to `unknown` during resolution.
pub(crate) fn probe_payload(connection: &ConnectionModel) -> serde_json::Value {
    let (status, reason) = match connection.status.as_str() {
        "active" if connection.refresh_token_ciphertext.is_none() => {
            ("reauth_required", "missing_refresh_token")
        }
        "active" => ("connected", "ok"),
        "revoked" => ("reauth_required", "token_revoked"),
        "expired" => ("reauth_required", "expired"),
        other => (other, "unknown"),
    };
    json!({ "connection": { "status": status, "reason": reason } })
}

/// Returns the normalized Google Business connection status for the account
#[utoipa::path(
    get,
    path = "/connections/google/status",
    security(("bearer_auth" = [])),
    params(AccountHeader),
    responses(
        (status = 200, description = "Normalized connection status", body = ConnectionStatusResponse, example = json!({
            "connection": {
                "status": "connected",
                "reason": "ok"
            }
        })),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "No connection exists for the account", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn connection_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
) -> Result<Json<ConnectionStatusResponse>, ApiError> {
    let connection = state.connections.find_by_account(&account.0).await?;
    Ok(Json(status_response(connection)?))
}

/// Builds the probe response for a stored connection row. A missing row
/// yields 404; mapping that onto `disconnected/no_connection` is the
/// consuming resolver's job, not the probe's.
fn status_response(
    connection: Option<ConnectionModel>,
) -> Result<ConnectionStatusResponse, ApiError> {
    let Some(connection) = connection else {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "no Google Business connection exists for this account",
        ));
    };

    let payload = probe_payload(&connection);
    let resolved: ResolvedStatus = status::resolve(200, Some(&payload));

    Ok(ConnectionStatusResponse {
        connection: ConnectionState {
            status: resolved.status.as_str().to_string(),
            reason: resolved.reason.as_str().to_string(),
            last_error: connection.last_error,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn connection_with(status: &str, has_refresh: bool) -> ConnectionModel {
        let now = Utc::now();
        ConnectionModel {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            provider: "google_business".to_string(),
            status: status.to_string(),
            access_token_ciphertext: None,
            refresh_token_ciphertext: has_refresh.then(|| vec![1u8, 2, 3]),
            token_type: "Bearer".to_string(),
            scope: None,
            expires_at: None,
            last_error: None,
            revision: 0,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn active_connection_reports_connected() {
        let payload = probe_payload(&connection_with("active", true));
        let resolved = status::resolve(200, Some(&payload));
        assert_eq!(resolved.status.as_str(), "connected");
        assert_eq!(resolved.reason.as_str(), "ok");
    }

    #[test]
    fn active_without_refresh_token_requires_reauth() {
        let payload = probe_payload(&connection_with("active", false));
        let resolved = status::resolve(200, Some(&payload));
        assert_eq!(resolved.status.as_str(), "reauth_required");
        assert_eq!(resolved.reason.as_str(), "missing_refresh_token");
    }

    #[test]
    fn revoked_connection_requires_reauth() {
        let payload = probe_payload(&connection_with("revoked", true));
        let resolved = status::resolve(200, Some(&payload));
        assert_eq!(resolved.status.as_str(), "reauth_required");
        assert_eq!(resolved.reason.as_str(), "token_revoked");
    }

    #[test]
    fn unrecognized_stored_status_normalizes_to_unknown() {
        let payload = probe_payload(&connection_with("weird", true));
        let resolved = status::resolve(200, Some(&payload));
        assert_eq!(resolved.status.as_str(), "unknown");
    }

    #[test]
    fn missing_connection_is_a_404_probe() {
        let err = status_response(None).expect_err("missing row is not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        // Consumers map the 404 probe to disconnected/no_connection.
        let resolved = status::resolve(404, None);
        assert_eq!(resolved.status.as_str(), "disconnected");
        assert_eq!(resolved.reason.as_str(), "no_connection");
    }

    #[test]
    fn stored_row_resolves_through_probe_vocabulary() {
        let mut connection = connection_with("revoked", true);
        connection.last_error = Some("invalid_grant".to_string());
        let response = status_response(Some(connection)).expect("resolves");
        assert_eq!(response.connection.status, "reauth_required");
        assert_eq!(response.connection.reason, "token_revoked");
        assert_eq!(response.connection.last_error.as_deref(), Some("invalid_grant"));
    }
}
