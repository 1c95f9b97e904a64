//! License entitlement routes.
//!
//! ```text
//! POST   /license/activate    -> activate
//! DELETE /license/deactivate  -> deactivate
//! POST   /license/deactivate  -> deactivate (legacy clients that
//!                                cannot send DELETE with a body)
//! GET    /license/check       -> check
//! ```

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::license;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/license/activate", post(license::activate))
        .route(
            "/license/deactivate",
            delete(license::deactivate).post(license::deactivate),
        )
        .route("/license/check", get(license::check))
}
