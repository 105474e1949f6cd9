//! # Server Configuration
//!
//! Router assembly, shared application state, and server startup for the
//! review sync API.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::orchestrator::SyncOrchestrator;
use crate::provider::GoogleBusinessClient;
use crate::reconcile::ReviewReconciler;
use crate::repositories::{
    ConnectionRepository, LocationRepository, ReviewRepository, SyncRunRepository,
};
use crate::scheduler::SyncScheduler;
use crate::telemetry::{TraceContext, with_trace_context};
use crate::token::TokenManager;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub connections: ConnectionRepository,
    pub runs: SyncRunRepository,
    pub orchestrator: SyncOrchestrator,
}

impl AppState {
    /// Wire repositories, token manager, and orchestrator from config and a
    /// database pool.
    pub fn build(config: Arc<AppConfig>, db: DatabaseConnection) -> anyhow::Result<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("REVSYNC_CRYPTO_KEY is required"))?;
        let crypto_key =
            CryptoKey::new(key_bytes).map_err(|e| anyhow::anyhow!("invalid crypto key: {}", e))?;

        let shared_db = Arc::new(db.clone());
        let connections = ConnectionRepository::new(Arc::clone(&shared_db), crypto_key);
        let locations = LocationRepository::new(Arc::clone(&shared_db));
        let reviews = ReviewRepository::new(Arc::clone(&shared_db));
        let runs = SyncRunRepository::new(Arc::clone(&shared_db));

        let tokens = TokenManager::new(
            connections.clone(),
            config.google_oauth_base.clone(),
            config.google_client_id.clone().unwrap_or_default(),
            config.google_client_secret.clone().unwrap_or_default(),
            config.token.refresh_margin_seconds,
            Duration::from_secs(config.token.http_timeout_seconds),
        );

        let client = GoogleBusinessClient::new(
            config.google_api_base.clone(),
            config.sync.page_size,
            Duration::from_secs(config.token.http_timeout_seconds),
        );

        let orchestrator = SyncOrchestrator::new(
            connections.clone(),
            locations,
            runs.clone(),
            ReviewReconciler::new(reviews),
            tokens,
            Arc::new(client),
            config.sync.clone(),
        );

        Ok(Self {
            config,
            db,
            connections,
            runs,
            orchestrator,
        })
    }
}

/// Installs a fresh trace context on each request so log lines and error
/// responses share a correlation ID.
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let context = TraceContext::generate();
    request.extensions_mut().insert(context.clone());
    with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let protected = Router::new()
        .route("/connections/google/status", get(handlers::status::connection_status))
        .route("/sync/reviews", post(handlers::sync::trigger_sync))
        .route("/sync/runs", get(handlers::runs::list_runs))
        .layer(axum::middleware::from_fn_with_state(
            config,
            crate::auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::health::healthz))
        .merge(protected)
        .with_state(state)
        .layer(axum::middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let config = Arc::new(config);
    let state = AppState::build(Arc::clone(&config), db.clone())?;

    let shutdown = CancellationToken::new();
    let scheduler = SyncScheduler::new(
        Arc::clone(&config),
        Arc::new(db),
        state.runs.clone(),
        state.orchestrator.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    let _ = scheduler_handle.await;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("opaque")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health::healthz,
        crate::handlers::status::connection_status,
        crate::handlers::sync::trigger_sync,
        crate::handlers::runs::list_runs,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::health::HealthResponse,
            crate::handlers::status::ConnectionState,
            crate::handlers::status::ConnectionStatusResponse,
            crate::handlers::runs::SyncRunInfo,
            crate::handlers::runs::SyncRunsResponse,
            crate::orchestrator::BatchResult,
            crate::orchestrator::LocationResult,
            crate::error::ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Revsync API",
        description = "Google Business Profile review sync service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
