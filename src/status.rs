//! Connection status resolution.
//!
//! Maps a probe result (HTTP status + payload) into a normalized
//! `{status, reason}` pair. Classification is pure and total: any
//! unrecognized shape or value falls through to `unknown/unknown`
//! rather than erroring.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Normalized connection status surfaced to UI and automation consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    ReauthRequired,
    #[serde(other)]
    Unknown,
}

/// Reason accompanying a connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionReason {
    Ok,
    TokenRevoked,
    MissingRefreshToken,
    Expired,
    NoConnection,
    #[serde(other)]
    Unknown,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::ReauthRequired => "reauth_required",
            ConnectionStatus::Unknown => "unknown",
        }
    }
}

impl ConnectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionReason::Ok => "ok",
            ConnectionReason::TokenRevoked => "token_revoked",
            ConnectionReason::MissingRefreshToken => "missing_refresh_token",
            ConnectionReason::Expired => "expired",
            ConnectionReason::NoConnection => "no_connection",
            ConnectionReason::Unknown => "unknown",
        }
    }
}

/// Result of resolving a probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResolvedStatus {
    pub status: ConnectionStatus,
    pub reason: ConnectionReason,
}

impl ResolvedStatus {
    pub const UNKNOWN: Self = Self {
        status: ConnectionStatus::Unknown,
        reason: ConnectionReason::Unknown,
    };

    pub const NO_CONNECTION: Self = Self {
        status: ConnectionStatus::Disconnected,
        reason: ConnectionReason::NoConnection,
    };
}

// Probe payload shape: `{ "connection": { "status": ..., "reason": ... } }`.
// Deserialized strictly enough to notice missing fields but loosely enough
// that out-of-domain values collapse to Unknown via `#[serde(other)]`.
#[derive(Debug, Deserialize)]
struct ProbePayload {
    connection: ProbeConnection,
}

#[derive(Debug, Deserialize)]
struct ProbeConnection {
    status: ConnectionStatus,
    reason: ConnectionReason,
}

/// Classify a probe result into a normalized status/reason pair.
///
/// Rules, evaluated in order:
/// 1. HTTP 404 means no connection row exists: `disconnected/no_connection`.
/// 2. HTTP 200 with a well-formed `connection` object passes `status` and
///    `reason` through; values outside the enumerated domains normalize to
///    `unknown`.
/// 3. Anything else (401, 500, malformed payload) is `unknown/unknown`.
pub fn resolve(probe_http_status: u16, payload: Option<&serde_json::Value>) -> ResolvedStatus {
    if probe_http_status == 404 {
        return ResolvedStatus::NO_CONNECTION;
    }

    if probe_http_status != 200 {
        return ResolvedStatus::UNKNOWN;
    }

    let Some(value) = payload else {
        return ResolvedStatus::UNKNOWN;
    };

    match serde_json::from_value::<ProbePayload>(value.clone()) {
        Ok(parsed) => ResolvedStatus {
            status: parsed.connection.status,
            reason: parsed.connection.reason,
        },
        Err(_) => ResolvedStatus::UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn not_found_wins_regardless_of_payload() {
        let payloads = [
            None,
            Some(json!({})),
            Some(json!({"connection": {"status": "connected", "reason": "ok"}})),
            Some(json!("garbage")),
        ];
        for payload in &payloads {
            assert_eq!(resolve(404, payload.as_ref()), ResolvedStatus::NO_CONNECTION);
        }
    }

    #[test]
    fn well_formed_payload_passes_through() {
        let cases = [
            ("connected", "ok", ConnectionStatus::Connected, ConnectionReason::Ok),
            (
                "reauth_required",
                "token_revoked",
                ConnectionStatus::ReauthRequired,
                ConnectionReason::TokenRevoked,
            ),
            (
                "reauth_required",
                "missing_refresh_token",
                ConnectionStatus::ReauthRequired,
                ConnectionReason::MissingRefreshToken,
            ),
            (
                "disconnected",
                "no_connection",
                ConnectionStatus::Disconnected,
                ConnectionReason::NoConnection,
            ),
            ("unknown", "expired", ConnectionStatus::Unknown, ConnectionReason::Expired),
        ];

        for (status, reason, want_status, want_reason) in cases {
            let payload = json!({"connection": {"status": status, "reason": reason}});
            let resolved = resolve(200, Some(&payload));
            assert_eq!(resolved.status, want_status, "status {status}");
            assert_eq!(resolved.reason, want_reason, "reason {reason}");
        }
    }

    #[test]
    fn out_of_domain_values_normalize_to_unknown() {
        let payload = json!({"connection": {"status": "banana", "reason": "ok"}});
        let resolved = resolve(200, Some(&payload));
        assert_eq!(resolved.status, ConnectionStatus::Unknown);
        assert_eq!(resolved.reason, ConnectionReason::Ok);

        let payload = json!({"connection": {"status": "connected", "reason": 42}});
        // Non-string reason fails the parse entirely; whole result is unknown.
        assert_eq!(resolve(200, Some(&payload)), ResolvedStatus::UNKNOWN);
    }

    #[test]
    fn unauthorized_probe_is_unknown() {
        let payload = json!({"connection": {"status": "connected", "reason": "ok"}});
        assert_eq!(resolve(401, Some(&payload)), ResolvedStatus::UNKNOWN);
        assert_eq!(resolve(401, None), ResolvedStatus::UNKNOWN);
    }

    #[test]
    fn server_errors_and_malformed_payloads_are_unknown() {
        assert_eq!(resolve(500, None), ResolvedStatus::UNKNOWN);
        assert_eq!(resolve(200, None), ResolvedStatus::UNKNOWN);
        assert_eq!(resolve(200, Some(&json!({}))), ResolvedStatus::UNKNOWN);
        assert_eq!(resolve(200, Some(&json!({"connection": {}}))), ResolvedStatus::UNKNOWN);
        assert_eq!(resolve(200, Some(&json!([1, 2, 3]))), ResolvedStatus::UNKNOWN);
    }

    #[test]
    fn string_forms_are_stable() {
        assert_eq!(ConnectionStatus::ReauthRequired.as_str(), "reauth_required");
        assert_eq!(ConnectionReason::MissingRefreshToken.as_str(), "missing_refresh_token");
        let serialized = serde_json::to_string(&ConnectionStatus::Connected).expect("serializes");
        assert_eq!(serialized, "\"connected\"");
    }
}
