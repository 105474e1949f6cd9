//! Integration tests for the token lifecycle against a mocked OAuth
//! token endpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use revsync::crypto::CryptoKey;
use revsync::models::connection::Model as ConnectionModel;
use revsync::repositories::ConnectionRepository;
use revsync::token::{TokenError, TokenManager};

async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    Migrator::up(&db, None).await.expect("migrations apply");
    db
}

fn repository(db: &DatabaseConnection) -> ConnectionRepository {
    let key = CryptoKey::new(vec![9u8; 32]).expect("32-byte key");
    ConnectionRepository::new(Arc::new(db.clone()), key)
}

fn manager(connections: ConnectionRepository, oauth_base: String) -> TokenManager {
    TokenManager::new(
        connections,
        oauth_base,
        "client-id".to_string(),
        "client-secret".to_string(),
        300,
        Duration::from_secs(5),
    )
}

async fn seed_connection(
    connections: &ConnectionRepository,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
    expires_in: ChronoDuration,
) -> ConnectionModel {
    connections
        .create_with_tokens(
            Uuid::new_v4(),
            access_token,
            refresh_token,
            Some(Utc::now() + expires_in),
            Some("https://www.googleapis.com/auth/business.manage".to_string()),
        )
        .await
        .expect("connection inserts")
}

#[tokio::test]
async fn stale_token_is_refreshed_and_rotation_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "expires_in": 3600,
            "refresh_token": "rotated-refresh",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let db = test_db().await;
    let connections = repository(&db);
    let connection = seed_connection(
        &connections,
        Some("old-access"),
        Some("old-refresh"),
        ChronoDuration::minutes(-5),
    )
    .await;

    let tokens = manager(connections.clone(), server.uri());
    let access = tokens
        .obtain_access_token(&connection)
        .await
        .expect("refresh succeeds");
    assert_eq!(access.secret, "new-access");
    assert!(access.expires_at.expect("expiry set") > Utc::now());

    let stored = connections
        .get_by_id(&connection.id)
        .await
        .expect("lookup")
        .expect("connection exists");
    assert_eq!(stored.status, "active");
    assert_eq!(stored.revision, connection.revision + 1);

    let (access_plain, refresh_plain) = connections
        .decrypt_tokens(&stored)
        .await
        .expect("decrypts");
    assert_eq!(access_plain.as_deref(), Some("new-access"));
    assert_eq!(refresh_plain.as_deref(), Some("rotated-refresh"));
}

#[tokio::test]
async fn refresh_without_rotation_keeps_stored_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let db = test_db().await;
    let connections = repository(&db);
    let connection = seed_connection(
        &connections,
        Some("old-access"),
        Some("keep-me"),
        ChronoDuration::minutes(-5),
    )
    .await;

    let tokens = manager(connections.clone(), server.uri());
    tokens
        .obtain_access_token(&connection)
        .await
        .expect("refresh succeeds");

    let stored = connections
        .get_by_id(&connection.id)
        .await
        .expect("lookup")
        .expect("connection exists");
    let (_, refresh_plain) = connections
        .decrypt_tokens(&stored)
        .await
        .expect("decrypts");
    assert_eq!(refresh_plain.as_deref(), Some("keep-me"));
}

#[tokio::test]
async fn concurrent_refreshes_resolve_to_a_single_winning_revision() {
    let server = MockServer::start().await;
    // Distinct tokens per call so adoption is observable.
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-first",
            "expires_in": 3600,
            "refresh_token": "rotated-first"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-second",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let db = test_db().await;
    let connections = repository(&db);
    let connection = seed_connection(
        &connections,
        Some("old-access"),
        Some("old-refresh"),
        ChronoDuration::minutes(-5),
    )
    .await;

    // Both callers start from the same stale row, so both refresh and
    // race the conditional write on the revision column.
    let tokens = manager(connections.clone(), server.uri());
    let (first, second) = tokio::join!(
        tokens.obtain_access_token(&connection),
        tokens.obtain_access_token(&connection)
    );
    let first = first.expect("first caller gets a token");
    let second = second.expect("second caller gets a token");

    // Exactly one write landed; the loser adopted the winner's stored
    // token instead of clobbering it.
    let stored = connections
        .get_by_id(&connection.id)
        .await
        .expect("lookup")
        .expect("connection exists");
    assert_eq!(stored.revision, connection.revision + 1);

    let (access_plain, _) = connections
        .decrypt_tokens(&stored)
        .await
        .expect("decrypts");
    let winner = access_plain.expect("access token stored");
    assert_eq!(first.secret, winner);
    assert_eq!(second.secret, winner);
}

#[tokio::test]
async fn invalid_grant_marks_connection_revoked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let db = test_db().await;
    let connections = repository(&db);
    let connection = seed_connection(
        &connections,
        Some("old-access"),
        Some("dead-refresh"),
        ChronoDuration::minutes(-5),
    )
    .await;

    let tokens = manager(connections.clone(), server.uri());
    let err = tokens
        .obtain_access_token(&connection)
        .await
        .expect_err("revocation surfaces");
    assert!(matches!(err, TokenError::TokenRevoked));
    assert!(err.is_terminal());

    let stored = connections
        .get_by_id(&connection.id)
        .await
        .expect("lookup")
        .expect("connection exists");
    assert_eq!(stored.status, "revoked");
    assert!(stored.last_error.is_some());
}

#[tokio::test]
async fn fresh_token_is_served_without_touching_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let db = test_db().await;
    let connections = repository(&db);
    let connection = seed_connection(
        &connections,
        Some("still-good"),
        Some("refresh"),
        ChronoDuration::hours(1),
    )
    .await;

    let tokens = manager(connections.clone(), server.uri());
    let access = tokens
        .obtain_access_token(&connection)
        .await
        .expect("stored token is used");
    assert_eq!(access.secret, "still-good");
}

#[tokio::test]
async fn token_inside_refresh_margin_counts_as_stale() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "refreshed",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let db = test_db().await;
    let connections = repository(&db);
    // Expires in 2 minutes; the 5-minute margin makes it stale.
    let connection = seed_connection(
        &connections,
        Some("nearly-expired"),
        Some("refresh"),
        ChronoDuration::minutes(2),
    )
    .await;

    let tokens = manager(connections.clone(), server.uri());
    let access = tokens
        .obtain_access_token(&connection)
        .await
        .expect("refresh succeeds");
    assert_eq!(access.secret, "refreshed");
}

#[tokio::test]
async fn server_errors_are_retryable_and_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let db = test_db().await;
    let connections = repository(&db);
    let connection = seed_connection(
        &connections,
        Some("old-access"),
        Some("refresh"),
        ChronoDuration::minutes(-5),
    )
    .await;

    let tokens = manager(connections.clone(), server.uri());
    let err = tokens
        .obtain_access_token(&connection)
        .await
        .expect_err("refresh fails");
    assert!(matches!(err, TokenError::RefreshFailed(_)));
    assert!(!err.is_terminal());

    let stored = connections
        .get_by_id(&connection.id)
        .await
        .expect("lookup")
        .expect("connection exists");
    assert_eq!(stored.status, "error");
}

#[tokio::test]
async fn missing_refresh_token_is_terminal_without_network() {
    let db = test_db().await;
    let connections = repository(&db);
    let connection = seed_connection(
        &connections,
        Some("expired"),
        None,
        ChronoDuration::minutes(-5),
    )
    .await;

    let tokens = manager(connections.clone(), "http://127.0.0.1:1".to_string());
    let err = tokens
        .obtain_access_token(&connection)
        .await
        .expect_err("missing refresh token surfaces");
    assert!(matches!(err, TokenError::MissingRefreshToken));
    assert!(err.is_terminal());
}
