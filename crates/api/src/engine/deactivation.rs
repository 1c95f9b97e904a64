//! The deactivation resolver.
//!
//! Resolves a device identifier (machine id or fingerprint) to a
//! concrete machine id, deactivates it upstream, and removes the local
//! record. "Already gone" is success: retried deactivations must not
//! scare users with errors for work that is already done.

use keyline_core::decision::RejectionCode;
use keyline_core::error::CoreError;

use crate::error::{AppError, AppResult};

use super::{CallerIdentity, EntitlementEngine};

/// Input for one deactivation attempt. At least one of `machine_id` /
/// `fingerprint` must be supplied; `license_id` is always required.
#[derive(Debug, Clone)]
pub struct DeactivationRequest {
    pub machine_id: Option<String>,
    pub fingerprint: Option<String>,
    pub license_id: String,
}

/// Outcome of a deactivation attempt.
#[derive(Debug, Clone)]
pub enum DeactivationOutcome {
    /// The device is gone (removed now, or already gone before).
    Removed { message: String },
    /// The identifier could not be resolved to a machine.
    Rejected { code: RejectionCode, detail: String },
}

impl EntitlementEngine {
    /// Deactivate a device and drop its registry record.
    ///
    /// Authenticated owner-type callers must own `license_id`.
    /// Unauthenticated legacy device-originated calls bypass that check
    /// on purpose: the device knows its own machine id but has no
    /// session to prove ownership with. Do not collapse the two paths.
    pub async fn deactivate(
        &self,
        request: &DeactivationRequest,
        identity: Option<&CallerIdentity>,
    ) -> AppResult<DeactivationOutcome> {
        if request.license_id.trim().is_empty() {
            return Err(AppError::BadRequest("licenseId is required".into()));
        }
        let has_machine_id = request
            .machine_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        let has_fingerprint = request
            .fingerprint
            .as_deref()
            .is_some_and(|fp| !fp.trim().is_empty());
        if !has_machine_id && !has_fingerprint {
            return Err(AppError::BadRequest(
                "machineId or fingerprint is required".into(),
            ));
        }

        if let Some(caller) = identity {
            let owned = self.directory.licenses_for_email(&caller.email).await?;
            let owns = owned
                .iter()
                .any(|record| record.license_id == request.license_id);
            if !owns {
                return Err(AppError::Core(CoreError::Forbidden(
                    "this license does not belong to the caller".into(),
                )));
            }
        }

        let machine_id = if has_machine_id {
            request.machine_id.clone().unwrap_or_default()
        } else {
            let fingerprint = request.fingerprint.as_deref().unwrap_or_default();
            let resolved = self
                .registry
                .find_by_fingerprint(&request.license_id, fingerprint)
                .await?
                .and_then(|record| record.machine_id);
            match resolved {
                Some(id) => id,
                None => {
                    return Ok(DeactivationOutcome::Rejected {
                        code: RejectionCode::ResolutionFailed,
                        detail: format!(
                            "no activated device matches fingerprint '{fingerprint}'"
                        ),
                    });
                }
            }
        };

        let existed_upstream = self.provider.deactivate_device(&machine_id).await?;
        let existed_locally = self.registry.remove_by_machine_id(&machine_id).await?;

        tracing::info!(
            machine_id = %machine_id,
            license_id = %request.license_id,
            existed_upstream,
            existed_locally,
            "device deactivated"
        );

        let message = if existed_upstream || existed_locally {
            "Device deactivated".to_string()
        } else {
            "Device was not found; it may already be deactivated".to_string()
        };
        Ok(DeactivationOutcome::Removed { message })
    }
}
