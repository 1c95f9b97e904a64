//! License activation, deactivation, and check handlers.
//!
//! Responses always carry a machine-readable `code` next to the HTTP
//! status so device-side polling logic can branch without string-
//! matching messages. The activation handler selects the enforcement
//! mode explicitly from the verified identity: seat-authenticated
//! callers get hard quota enforcement, legacy unauthenticated callers
//! get the soft path.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use keyline_core::decision::{EnforcementMode, EntitlementDecision};
use keyline_core::validation::LicenseSnapshot;

use crate::engine::activation::ActivationRequest;
use crate::engine::deactivation::{DeactivationOutcome, DeactivationRequest};
use crate::engine::CallerIdentity;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::OptionalAuthUser;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateBody {
    #[serde(default)]
    pub license_key: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateBody {
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub license_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    #[serde(default)]
    pub email: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /license/activate
///
/// Optional bearer auth. Authenticated requests are seat-scoped with
/// hard quota enforcement (403 on exhaustion); unauthenticated legacy
/// requests are license-scoped with a soft limit.
///
/// The 200 body shape depends on the decision branch. A fresh
/// activation carries the quota fields (`deviceCount`, `maxDevices`,
/// `planName`, `overLimit`); the `alreadyActivated` short-circuit
/// returns before quota resolution and omits them, carrying only
/// `machineId`, `effectiveValid`, and `license`. Consumers must key
/// off `alreadyActivated` rather than assuming the full field set.
pub async fn activate(
    OptionalAuthUser(user): OptionalAuthUser,
    State(state): State<AppState>,
    Json(body): Json<ActivateBody>,
) -> AppResult<impl IntoResponse> {
    let identity = user.map(|user| CallerIdentity {
        user_id: user.user_id,
        email: user.email,
    });
    let mode = if identity.is_some() {
        EnforcementMode::Hard
    } else {
        EnforcementMode::Soft
    };

    let request = ActivationRequest {
        license_key: body.license_key,
        fingerprint: body.fingerprint,
        device_name: body.device_name,
        platform: body.platform,
    };

    let decision = state
        .engine
        .activate(&request, identity.as_ref(), mode)
        .await?;

    Ok(render_decision(decision, &request.fingerprint))
}

fn license_json(license: Option<&LicenseSnapshot>) -> serde_json::Value {
    match license {
        Some(license) => json!({
            "id": license.id,
            "status": license.status,
            "expiry": license.expiry,
        }),
        None => serde_json::Value::Null,
    }
}

fn render_decision(decision: EntitlementDecision, fingerprint: &str) -> impl IntoResponse {
    match decision {
        EntitlementDecision::AlreadyActivated {
            machine_id,
            effective_valid,
            license,
        } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "alreadyActivated": true,
                "valid": true,
                "effectiveValid": effective_valid,
                "machineId": machine_id,
                "license": license_json(license.as_ref()),
            })),
        ),
        EntitlementDecision::Activated {
            machine_id,
            device_count,
            max_devices,
            plan_name,
            over_limit,
            license,
        } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "activated": true,
                "deviceCount": device_count,
                "maxDevices": max_devices,
                "planName": plan_name,
                "overLimit": over_limit,
                "machine": {
                    "machineId": machine_id,
                    "fingerprint": fingerprint,
                },
                "license": license_json(Some(&license)),
                "message": if over_limit {
                    Some("Device limit reached; upgrade your plan to keep all devices active")
                } else {
                    None
                },
            })),
        ),
        EntitlementDecision::Rejected {
            code,
            detail,
            machine_id,
        } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "code": code.as_str(),
                "error": detail,
                "machineId": machine_id,
            })),
        ),
        EntitlementDecision::QuotaExceeded {
            device_count,
            max_devices,
            plan_name,
        } => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "code": "DEVICE_LIMIT_EXCEEDED",
                "error": format!(
                    "The {plan_name} plan allows {max_devices} active devices per seat; \
                     {device_count} are already active"
                ),
                "deviceCount": device_count,
                "maxDevices": max_devices,
                "planName": plan_name,
            })),
        ),
    }
}

/// DELETE /license/deactivate (POST alias accepted)
///
/// Optional session. Authenticated owner callers must own the license;
/// unauthenticated device-originated calls bypass the ownership check
/// by design.
pub async fn deactivate(
    OptionalAuthUser(user): OptionalAuthUser,
    State(state): State<AppState>,
    Json(body): Json<DeactivateBody>,
) -> AppResult<impl IntoResponse> {
    let identity = user.map(|user| CallerIdentity {
        user_id: user.user_id,
        email: user.email,
    });

    let request = DeactivationRequest {
        machine_id: body.machine_id,
        fingerprint: body.fingerprint,
        license_id: body.license_id,
    };

    let outcome = state
        .engine
        .deactivate(&request, identity.as_ref())
        .await?;

    let response = match outcome {
        DeactivationOutcome::Removed { message } => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": message })),
        ),
        DeactivationOutcome::Rejected { code, detail } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "code": code.as_str(),
                "error": detail,
            })),
        ),
    };
    Ok(response)
}

/// GET /license/check?email=
///
/// Public lookup of license status by owner email, rate limited per
/// email to keep it from becoming an enumeration oracle.
pub async fn check(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> AppResult<impl IntoResponse> {
    let email = params.email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("a valid email is required".into()));
    }

    if !state.check_limiter.allow(&email) {
        return Err(AppError::RateLimited);
    }

    let record = state
        .directory
        .licenses_for_email(&email)
        .await?
        .into_iter()
        .next();

    let response = match record {
        None => Json(json!({ "status": "none" })),
        Some(record) => {
            let status = record
                .status
                .as_deref()
                .unwrap_or("active")
                .to_ascii_lowercase();
            Json(json!({
                "status": status,
                "licenseKey": record.license_key,
                "licenseId": record.license_id,
                "plan": record.plan_name,
                "expiresAt": record.expires_at,
            }))
        }
    };
    Ok(response)
}
