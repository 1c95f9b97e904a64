use std::sync::Arc;

use keyline_db::directory::LicenseDirectory;

use crate::config::ServerConfig;
use crate::engine::EntitlementEngine;
use crate::ratelimit::FixedWindowLimiter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (health checks; the engine goes through
    /// its trait seams instead).
    pub pool: keyline_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The activation/deactivation engine.
    pub engine: Arc<EntitlementEngine>,
    /// License mirror, for the check-by-email endpoint.
    pub directory: Arc<dyn LicenseDirectory>,
    /// Rate limiter for the public check endpoint.
    pub check_limiter: Arc<FixedWindowLimiter>,
}
