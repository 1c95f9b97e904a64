//! Entitlement decisions produced by the activation engine.

use serde::Serialize;

use crate::validation::{LicenseSnapshot, ValidationCode};

/// How the quota check is enforced for an activation attempt.
///
/// Selected explicitly by the caller, never inferred mid-engine: the
/// legacy device/extension path activates past the limit with a warning,
/// the seat-authenticated portal path refuses outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    /// Over-quota activation proceeds, flagged `over_limit`.
    Soft,
    /// Over-quota activation is refused with `DEVICE_LIMIT_EXCEEDED`.
    Hard,
}

/// Why an activation attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCode {
    /// The provider reported an invalid state (expired, suspended, ...).
    Provider(ValidationCode),
    /// The provider said "not yet activated" without embedding the
    /// license identity needed to continue.
    LicenseDataMissing,
    /// A fingerprint could not be resolved to a known machine id.
    ResolutionFailed,
}

impl RejectionCode {
    /// Machine-readable code string for HTTP responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider(code) => code.as_str(),
            Self::LicenseDataMissing => "LICENSE_DATA_MISSING",
            Self::ResolutionFailed => "RESOLUTION_FAILED",
        }
    }
}

impl Serialize for RejectionCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The engine's final verdict for one activation attempt.
///
/// Ephemeral: owned by the call that produced it, carries everything the
/// HTTP layer needs to render a response without further lookups.
#[derive(Debug, Clone)]
pub enum EntitlementDecision {
    /// The device is already active; no provider activation was made.
    AlreadyActivated {
        /// Known machine id, when the registry has one.
        machine_id: Option<String>,
        /// `true` when validity was established by the self-heal
        /// heartbeat rather than the validate call itself.
        effective_valid: bool,
        /// License snapshot from the validate call, if embedded.
        license: Option<LicenseSnapshot>,
    },
    /// A new activation was created and durably recorded.
    Activated {
        machine_id: String,
        /// Devices counted active in the window, including this one.
        device_count: i64,
        /// Plan quota, `None` for unlimited.
        max_devices: Option<i32>,
        plan_name: String,
        /// Soft-mode flag: this activation pushed past the quota.
        over_limit: bool,
        license: LicenseSnapshot,
    },
    /// The attempt was refused with no side effects.
    Rejected {
        code: RejectionCode,
        detail: String,
        /// Exposed on the heartbeat-pending path so the caller's poll
        /// loop can retry the heartbeat on its own.
        machine_id: Option<String>,
    },
    /// Hard enforcement refused an over-quota activation.
    QuotaExceeded {
        device_count: i64,
        max_devices: i32,
        plan_name: String,
    },
}
