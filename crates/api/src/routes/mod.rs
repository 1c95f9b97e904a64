//! Route definitions.
//!
//! Route hierarchy:
//!
//! ```text
//! /health                        liveness + database ping
//!
//! /license/activate              POST          activate a device
//! /license/deactivate            DELETE|POST   deactivate a device
//! /license/check                 GET           license status by email
//! ```

pub mod health;
pub mod license;

use axum::Router;

use crate::state::AppState;

/// Build the full route tree.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(license::router())
}
