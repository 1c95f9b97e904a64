//! JWT-based authentication extractors for Axum handlers.
//!
//! Two extractors cover the two caller populations:
//! - [`AuthUser`] for endpoints that require a verified identity.
//! - [`OptionalAuthUser`] for the activation path, where legacy
//!   device/extension callers carry no token at all. A token that is
//!   present but invalid still fails with 401 -- only absence is
//!   tolerated.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use keyline_core::error::CoreError;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated caller extracted from a JWT Bearer token in the
/// `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Identity-provider user id (from `claims.sub`).
    pub user_id: String,
    /// The user's email address.
    pub email: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        parse_bearer(auth_header, state)
    }
}

/// Optional authenticated caller.
///
/// `None` means no `Authorization` header was sent (the legacy path).
/// A malformed or invalid token is rejected, never downgraded to
/// anonymous -- silently dropping identity would flip a seat-enforced
/// request onto the soft per-license path.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(auth_header) = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(OptionalAuthUser(None));
        };

        parse_bearer(auth_header, state).map(|user| OptionalAuthUser(Some(user)))
    }
}

fn parse_bearer(auth_header: &str, state: &AppState) -> Result<AuthUser, AppError> {
    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Core(CoreError::Unauthorized(
            "Invalid Authorization format. Expected: Bearer <token>".into(),
        ))
    })?;

    let claims = validate_token(token, &state.config.jwt).map_err(|_| {
        AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
    })?;

    Ok(AuthUser {
        user_id: claims.sub,
        email: claims.email,
    })
}
