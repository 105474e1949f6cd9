//! Token lifecycle management.
//!
//! Supplies a valid access token for a connection, refreshing against the
//! provider's token endpoint when the stored token is stale. Revocation
//! and missing-refresh-token conditions surface as terminal errors that
//! require the user to reconnect.
//!
//! Concurrent refreshes for the same connection are serialized through a
//! conditional write on the connection's `revision` column: the loser of
//! the race discards its own response and adopts the winner's token, so a
//! rotated refresh token is never clobbered.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::connection::Model as ConnectionModel;
use crate::repositories::ConnectionRepository;
use crate::status::ConnectionReason;

/// Errors surfaced while obtaining an access token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("connection has no refresh token")]
    MissingRefreshToken,
    #[error("refresh token was revoked by the provider")]
    TokenRevoked,
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("token state error: {0}")]
    Internal(String),
}

impl TokenError {
    /// Connection reason corresponding to this failure.
    pub fn reason(&self) -> ConnectionReason {
        match self {
            TokenError::MissingRefreshToken => ConnectionReason::MissingRefreshToken,
            TokenError::TokenRevoked => ConnectionReason::TokenRevoked,
            TokenError::RefreshFailed(_) | TokenError::Internal(_) => ConnectionReason::Unknown,
        }
    }

    /// Terminal failures require user reconnection; retrying per location
    /// cannot help, so the orchestrator short-circuits the whole batch.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TokenError::MissingRefreshToken | TokenError::TokenRevoked
        )
    }
}

/// A valid access token plus its expiry, ready for provider calls.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Token lifecycle manager for Google Business connections.
#[derive(Clone)]
pub struct TokenManager {
    connections: ConnectionRepository,
    http: reqwest::Client,
    oauth_base: String,
    client_id: String,
    client_secret: String,
    refresh_margin: ChronoDuration,
}

impl TokenManager {
    pub fn new(
        connections: ConnectionRepository,
        oauth_base: String,
        client_id: String,
        client_secret: String,
        refresh_margin_seconds: u64,
        http_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .unwrap_or_default();
        Self {
            connections,
            http,
            oauth_base,
            client_id,
            client_secret,
            refresh_margin: ChronoDuration::seconds(refresh_margin_seconds as i64),
        }
    }

    /// Returns a valid access token for the connection, refreshing if the
    /// stored one is stale.
    pub async fn obtain_access_token(
        &self,
        connection: &ConnectionModel,
    ) -> Result<AccessToken, TokenError> {
        let (access_token, refresh_token) = self
            .connections
            .decrypt_tokens(connection)
            .await
            .map_err(|e| TokenError::Internal(e.to_string()))?;

        if let (Some(secret), Some(expires_at)) = (access_token.as_ref(), connection.expires_at) {
            let expires_at: DateTime<Utc> = expires_at.into();
            if expires_at - self.refresh_margin > Utc::now() {
                debug!(connection_id = %connection.id, "Stored access token is still fresh");
                return Ok(AccessToken {
                    secret: secret.clone(),
                    expires_at: Some(expires_at),
                });
            }
        }

        let Some(refresh_token) = refresh_token else {
            warn!(connection_id = %connection.id, "Connection has no refresh token");
            self.record_failure(connection, &TokenError::MissingRefreshToken)
                .await;
            return Err(TokenError::MissingRefreshToken);
        };

        match self.refresh(connection, &refresh_token).await {
            Ok(token) => Ok(token),
            Err(err) => {
                self.record_failure(connection, &err).await;
                Err(err)
            }
        }
    }

    async fn refresh(
        &self,
        connection: &ConnectionModel,
        refresh_token: &str,
    ) -> Result<AccessToken, TokenError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(format!("{}/token", self.oauth_base.trim_end_matches('/')))
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| TokenError::RefreshFailed(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_refresh_error(status.as_u16(), &body));
        }

        let parsed: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| TokenError::RefreshFailed(format!("malformed token response: {}", e)))?;

        let expires_at = parsed
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));

        let stored = self
            .connections
            .store_refreshed_tokens(
                connection,
                &parsed.access_token,
                parsed.refresh_token.as_deref(),
                expires_at,
            )
            .await
            .map_err(|e| TokenError::Internal(e.to_string()))?;

        match stored {
            Some(_) => {
                info!(connection_id = %connection.id, "Refreshed access token");
                Ok(AccessToken {
                    secret: parsed.access_token,
                    expires_at,
                })
            }
            None => {
                // A concurrent refresh won the revision race; adopt its
                // token rather than persisting ours over a rotated secret.
                debug!(connection_id = %connection.id, "Lost refresh race, adopting winner's token");
                let winner = self
                    .connections
                    .get_by_id(&connection.id)
                    .await
                    .map_err(|e| TokenError::Internal(e.to_string()))?
                    .ok_or_else(|| {
                        TokenError::Internal("connection disappeared during refresh".to_string())
                    })?;
                let (access, _) = self
                    .connections
                    .decrypt_tokens(&winner)
                    .await
                    .map_err(|e| TokenError::Internal(e.to_string()))?;
                let secret = access.ok_or_else(|| {
                    TokenError::Internal("winning refresh left no access token".to_string())
                })?;
                Ok(AccessToken {
                    secret,
                    expires_at: winner.expires_at.map(Into::into),
                })
            }
        }
    }

    async fn record_failure(&self, connection: &ConnectionModel, err: &TokenError) {
        let status = match err {
            TokenError::TokenRevoked => "revoked",
            _ => "error",
        };
        if let Err(persist_err) = self
            .connections
            .mark_status(&connection.id, status, Some(&err.to_string()))
            .await
        {
            warn!(
                connection_id = %connection.id,
                error = %persist_err,
                "Failed to record token failure on connection"
            );
        }
    }
}

/// Classify a non-2xx token endpoint response.
///
/// Google reports a revoked or invalid refresh token as HTTP 400 with
/// `error == "invalid_grant"`; everything else is treated as retryable.
fn classify_refresh_error(status: u16, body: &str) -> TokenError {
    if status == 400
        && let Ok(parsed) = serde_json::from_str::<TokenEndpointError>(body)
        && parsed.error.as_deref() == Some("invalid_grant")
    {
        return TokenError::TokenRevoked;
    }

    let detail = serde_json::from_str::<TokenEndpointError>(body)
        .ok()
        .and_then(|e| e.error_description.or(e.error))
        .unwrap_or_else(|| body.chars().take(200).collect());

    TokenError::RefreshFailed(format!("token endpoint returned {}: {}", status, detail))
}
