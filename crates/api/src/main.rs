use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyline_api::config::ServerConfig;
use keyline_api::engine::EntitlementEngine;
use keyline_api::ratelimit::FixedWindowLimiter;
use keyline_api::{routes, state};
use keyline_db::directory::{LicenseDirectory, PgLicenseDirectory};
use keyline_db::registry::{DeviceRegistry, PgDeviceRegistry};
use keyline_provider::{CredentialCache, HttpLicenseProvider, LicenseProvider, StaticToken};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = keyline_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    keyline_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    keyline_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Provider client ---
    let credentials = CredentialCache::new(
        Box::new(StaticToken(config.engine.provider_token.clone())),
        Duration::from_secs(config.engine.provider_token_ttl_secs),
    );
    let provider: Arc<dyn LicenseProvider> = Arc::new(
        HttpLicenseProvider::new(
            config.engine.provider_url.clone(),
            credentials,
            Duration::from_secs(config.engine.provider_timeout_secs),
        )
        .expect("Failed to build provider client"),
    );
    tracing::info!(provider_url = %config.engine.provider_url, "Provider client ready");

    // --- Engine ---
    let registry: Arc<dyn DeviceRegistry> = Arc::new(PgDeviceRegistry::new(pool.clone()));
    let directory: Arc<dyn LicenseDirectory> = Arc::new(PgLicenseDirectory::new(pool.clone()));
    let engine = Arc::new(EntitlementEngine::new(
        Arc::clone(&registry),
        Arc::clone(&directory),
        Arc::clone(&provider),
        config.engine.activation_window_hours,
    ));

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- App state ---
    let check_limiter = Arc::new(FixedWindowLimiter::new(
        config.engine.check_rate_limit_per_min,
    ));
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine,
        directory,
        check_limiter,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        .merge(routes::api_routes())
        // Middleware stack, applied bottom-up.
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Resolve on SIGINT (Ctrl-C) or SIGTERM so in-flight activations can
/// finish before the listener closes, whether the stop comes from a
/// terminal or a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS layer from configuration. An unparseable origin is a
/// deployment mistake and panics at startup rather than serving with a
/// silently dropped origin.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{origin}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
