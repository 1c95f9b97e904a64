//! The activation coordinator.
//!
//! One activation attempt is a fixed sequence of gated steps: validate
//! with the provider, short-circuit if already valid, self-heal a
//! pending heartbeat, reject anything that is not an unbound-device
//! code, resolve the plan quota, count the concurrency window, then
//! activate exactly once and persist before answering. Each step's
//! outcome gates the next, so the awaits are deliberately sequential.
//!
//! Known limitation: two racing first activations for the same
//! (license, fingerprint) can both pass the "should activate" check and
//! both call the provider. The provider's own duplicate-fingerprint
//! constraints are the backstop; the registry's unique index then makes
//! the loser surface as a conflict rather than a double record.

use keyline_core::decision::{EnforcementMode, EntitlementDecision, RejectionCode};
use keyline_core::policy::{quota_for, QuotaScope, DEFAULT_PLAN};
use keyline_core::validation::{LicenseSnapshot, ValidationCode, ValidationOutcome};
use keyline_db::models::device_activation::CreateDeviceActivation;

use crate::error::{AppError, AppResult};

use super::{CallerIdentity, EntitlementEngine};

/// Input for one activation attempt.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    pub license_key: String,
    pub fingerprint: String,
    pub device_name: Option<String>,
    pub platform: Option<String>,
}

impl EntitlementEngine {
    /// Decide whether this device may be active, activating it if needed.
    ///
    /// Fails only for malformed input or unrecoverable provider/storage
    /// errors; every provider-reported invalidity comes back as a
    /// [`EntitlementDecision::Rejected`] with no side effects.
    pub async fn activate(
        &self,
        request: &ActivationRequest,
        identity: Option<&CallerIdentity>,
        mode: EnforcementMode,
    ) -> AppResult<EntitlementDecision> {
        if request.license_key.trim().is_empty() {
            return Err(AppError::BadRequest("licenseKey is required".into()));
        }
        if request.fingerprint.trim().is_empty() {
            return Err(AppError::BadRequest("fingerprint is required".into()));
        }

        let outcome = self
            .provider
            .validate(&request.license_key, &request.fingerprint)
            .await?;

        tracing::debug!(
            code = %outcome.code,
            valid = outcome.valid,
            fingerprint = %request.fingerprint,
            "provider validation outcome"
        );

        // Keep the local mirror fresh; a stale mirror only degrades the
        // check endpoint, so failure here must not fail the activation.
        if let Some(license) = &outcome.license {
            if let Err(err) = self
                .directory
                .refresh_snapshot(&license.id, license.status.as_deref(), license.expiry)
                .await
            {
                tracing::warn!(license_id = %license.id, error = %err, "license mirror refresh failed");
            }
        }

        // Idempotent short-circuit: a valid outcome means the device is
        // already activated, so repeated calls from a flaky client never
        // reach the provider's non-idempotent machine creation.
        if outcome.valid {
            return self.already_activated(&outcome, &request.fingerprint).await;
        }

        if outcome.code == ValidationCode::HeartbeatNotStarted {
            return self.self_heal(&outcome, &request.fingerprint).await;
        }

        if !outcome.code.is_activatable() {
            return Ok(EntitlementDecision::Rejected {
                code: RejectionCode::Provider(outcome.code),
                detail: outcome.detail,
                machine_id: None,
            });
        }

        // The provider said "not yet bound" -- it must still tell us
        // which license to bind to.
        let Some(license) = outcome.license else {
            return Ok(EntitlementDecision::Rejected {
                code: RejectionCode::LicenseDataMissing,
                detail: "provider response did not include license data".into(),
                machine_id: None,
            });
        };

        self.activate_new_device(request, identity, mode, license)
            .await
    }

    /// The provider already considers this device active.
    async fn already_activated(
        &self,
        outcome: &ValidationOutcome,
        fingerprint: &str,
    ) -> AppResult<EntitlementDecision> {
        let machine_id = match &outcome.license {
            Some(license) => self
                .registry
                .find_by_fingerprint(&license.id, fingerprint)
                .await?
                .and_then(|record| record.machine_id),
            None => None,
        };

        if let Some(id) = &machine_id {
            if let Err(err) = self.registry.touch_last_seen(id).await {
                tracing::warn!(machine_id = %id, error = %err, "last-seen update failed");
            }
        }

        Ok(EntitlementDecision::AlreadyActivated {
            machine_id,
            effective_valid: false,
            license: outcome.license.clone(),
        })
    }

    /// Repair a "pending heartbeat" state by issuing the missing
    /// heartbeat server-side instead of surfacing an error.
    async fn self_heal(
        &self,
        outcome: &ValidationOutcome,
        fingerprint: &str,
    ) -> AppResult<EntitlementDecision> {
        let known_machine_id = match &outcome.license {
            Some(license) => self
                .registry
                .find_by_fingerprint(&license.id, fingerprint)
                .await?
                .and_then(|record| record.machine_id),
            None => None,
        };

        let Some(machine_id) = known_machine_id else {
            // No record to heal; surface the provider's outcome as-is.
            return Ok(EntitlementDecision::Rejected {
                code: RejectionCode::Provider(ValidationCode::HeartbeatNotStarted),
                detail: outcome.detail.clone(),
                machine_id: None,
            });
        };

        // A heartbeat transport failure degrades to the rejection path
        // rather than failing the request: the caller's poll loop can
        // retry the heartbeat independently using the exposed id.
        let healed = match self.provider.heartbeat(&machine_id).await {
            Ok(status) if status.success => true,
            Ok(status) => {
                tracing::warn!(
                    machine_id = %machine_id,
                    error = status.error.as_deref().unwrap_or("unknown"),
                    "self-heal heartbeat rejected"
                );
                false
            }
            Err(err) => {
                tracing::warn!(machine_id = %machine_id, error = %err, "self-heal heartbeat failed");
                false
            }
        };

        if healed {
            if let Err(err) = self.registry.touch_last_seen(&machine_id).await {
                tracing::warn!(machine_id = %machine_id, error = %err, "last-seen update failed");
            }
            return Ok(EntitlementDecision::AlreadyActivated {
                machine_id: Some(machine_id),
                effective_valid: true,
                license: outcome.license.clone(),
            });
        }

        Ok(EntitlementDecision::Rejected {
            code: RejectionCode::Provider(ValidationCode::HeartbeatNotStarted),
            detail: outcome.detail.clone(),
            machine_id: Some(machine_id),
        })
    }

    /// Quota check, single provider activation, durable persistence,
    /// best-effort heartbeat.
    async fn activate_new_device(
        &self,
        request: &ActivationRequest,
        identity: Option<&CallerIdentity>,
        mode: EnforcementMode,
        license: LicenseSnapshot,
    ) -> AppResult<EntitlementDecision> {
        let plan_name = self
            .directory
            .find_by_license_id(&license.id)
            .await?
            .and_then(|record| record.plan_name)
            .unwrap_or_else(|| DEFAULT_PLAN.to_string());

        let quota = quota_for(&plan_name);
        let scope = match (quota.per_seat, identity) {
            (true, Some(caller)) => QuotaScope::PerSeat {
                license_id: license.id.clone(),
                user_id: caller.user_id.clone(),
            },
            _ => QuotaScope::PerLicense {
                license_id: license.id.clone(),
            },
        };

        let active = self.window.active_devices(&scope).await?;
        let device_count = active.len() as i64;

        let mut over_limit = false;
        if let Some(limit) = quota.limit {
            if device_count >= i64::from(limit) {
                match mode {
                    EnforcementMode::Hard => {
                        return Ok(EntitlementDecision::QuotaExceeded {
                            device_count,
                            max_devices: limit,
                            plan_name,
                        });
                    }
                    EnforcementMode::Soft => {
                        over_limit = true;
                    }
                }
            }
        }

        // Exactly one provider call per logical activation. Conflicts
        // (e.g. a racing duplicate fingerprint) surface as 422.
        let machine = self
            .provider
            .activate_device(
                &license.id,
                &request.fingerprint,
                request.device_name.as_deref(),
                request.platform.as_deref(),
            )
            .await?;

        // Persistence must complete before the decision is returned:
        // the recorded state feeds the next validate's self-heal path.
        let insert = CreateDeviceActivation {
            license_id: license.id.clone(),
            machine_id: Some(machine.machine_id.clone()),
            fingerprint: request.fingerprint.clone(),
            user_id: identity.map(|caller| caller.user_id.clone()),
            user_email: identity.map(|caller| caller.email.clone()),
            name: request.device_name.clone().or(machine.name.clone()),
            platform: request.platform.clone().or(machine.platform.clone()),
        };
        if let Err(err) = self.registry.insert(insert, identity.is_some()).await {
            // The provider now has state the local registry lacks.
            tracing::error!(
                machine_id = %machine.machine_id,
                license_id = %license.id,
                error = %err,
                "machine activated upstream but not recorded locally; needs reconciliation"
            );
            return Err(err.into());
        }

        // Pre-empt a future HEARTBEAT_NOT_STARTED classification. Losing
        // this ping costs nothing: the self-heal path covers it later.
        match self.provider.heartbeat(&machine.machine_id).await {
            Ok(status) if status.success => {
                if let Err(err) = self.registry.touch_last_seen(&machine.machine_id).await {
                    tracing::warn!(machine_id = %machine.machine_id, error = %err, "last-seen update failed");
                }
            }
            Ok(status) => {
                tracing::warn!(
                    machine_id = %machine.machine_id,
                    error = status.error.as_deref().unwrap_or("unknown"),
                    "post-activation heartbeat rejected"
                );
            }
            Err(err) => {
                tracing::warn!(machine_id = %machine.machine_id, error = %err, "post-activation heartbeat failed");
            }
        }

        tracing::info!(
            machine_id = %machine.machine_id,
            license_id = %license.id,
            plan = %plan_name,
            device_count = device_count + 1,
            over_limit,
            "device activated"
        );

        Ok(EntitlementDecision::Activated {
            machine_id: machine.machine_id,
            device_count: device_count + 1,
            max_devices: quota.limit,
            plan_name,
            over_limit,
            license,
        })
    }
}
