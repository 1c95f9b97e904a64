//! Normalized outcomes of upstream license validation.
//!
//! The upstream provider reports validation results as a string code in
//! `meta.code`. Every call site consumes the closed [`ValidationCode`]
//! enum instead of matching on raw strings, so adding a code forces an
//! exhaustive-match review across the engine.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Closed set of provider validation codes recognized by the engine.
///
/// Any string the provider sends outside this set is folded into
/// [`ValidationCode::UnknownError`] rather than failing deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// The license is valid and this device is already activated.
    Valid,
    /// No license matches the presented key.
    NotFound,
    /// The license exists but has expired.
    Expired,
    /// The license has been administratively suspended.
    Suspended,
    /// The license is fine but has no machines at all yet.
    NoMachines,
    /// The license has machines, but none match this fingerprint.
    FingerprintScopeMismatch,
    /// The device is activated but has never sent a heartbeat.
    HeartbeatNotStarted,
    /// Catch-all for provider codes we do not recognize.
    UnknownError,
}

impl ValidationCode {
    /// Parse a raw provider code string, folding unknowns into
    /// [`ValidationCode::UnknownError`].
    pub fn from_provider_str(raw: &str) -> Self {
        match raw {
            "VALID" => Self::Valid,
            "NOT_FOUND" => Self::NotFound,
            "EXPIRED" => Self::Expired,
            "SUSPENDED" => Self::Suspended,
            "NO_MACHINES" => Self::NoMachines,
            "FINGERPRINT_SCOPE_MISMATCH" => Self::FingerprintScopeMismatch,
            "HEARTBEAT_NOT_STARTED" => Self::HeartbeatNotStarted,
            _ => Self::UnknownError,
        }
    }

    /// The wire representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::NotFound => "NOT_FOUND",
            Self::Expired => "EXPIRED",
            Self::Suspended => "SUSPENDED",
            Self::NoMachines => "NO_MACHINES",
            Self::FingerprintScopeMismatch => "FINGERPRINT_SCOPE_MISMATCH",
            Self::HeartbeatNotStarted => "HEARTBEAT_NOT_STARTED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Whether this code means "license fine, device simply not bound
    /// yet" -- the two codes that branch into activation instead of
    /// rejection.
    pub fn is_activatable(&self) -> bool {
        matches!(self, Self::NoMachines | Self::FingerprintScopeMismatch)
    }
}

impl std::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a license embedded in a validation response.
///
/// Owned by the upstream provider; the engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseSnapshot {
    /// Opaque provider-assigned license id.
    pub id: String,
    /// Provider status string (`ACTIVE`, `EXPIRED`, `SUSPENDED`, ...).
    pub status: Option<String>,
    /// Expiry timestamp, if the license has one.
    pub expiry: Option<Timestamp>,
}

/// The normalized result of a validate-key call.
///
/// Transient value: produced per request, never persisted. Provider-
/// reported invalidity lands here as `valid: false`; only transport or
/// auth failures surface as errors from the client.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Whether the provider considers this (license, fingerprint) valid.
    pub valid: bool,
    /// Classification of the result.
    pub code: ValidationCode,
    /// Human-readable detail string from the provider.
    pub detail: String,
    /// License snapshot, when the provider embedded one.
    pub license: Option<LicenseSnapshot>,
}
