//! Wire types for the provider's fixed REST contract.
//!
//! The request/response shapes here are an external contract and must
//! not drift: `POST /licenses/actions/validate-key`, `POST /machines`,
//! `DELETE /machines/:id`, `POST /machines/:id/actions/ping`.

use serde::{Deserialize, Serialize};

use keyline_core::types::Timestamp;

// ---------------------------------------------------------------------------
// validate-key
// ---------------------------------------------------------------------------

/// Body of `POST /licenses/actions/validate-key`.
#[derive(Debug, Serialize)]
pub struct ValidateKeyRequest {
    pub meta: ValidateKeyMeta,
}

#[derive(Debug, Serialize)]
pub struct ValidateKeyMeta {
    pub key: String,
    pub scope: ValidateKeyScope,
}

#[derive(Debug, Serialize)]
pub struct ValidateKeyScope {
    pub fingerprint: String,
}

impl ValidateKeyRequest {
    pub fn new(key: &str, fingerprint: &str) -> Self {
        Self {
            meta: ValidateKeyMeta {
                key: key.to_string(),
                scope: ValidateKeyScope {
                    fingerprint: fingerprint.to_string(),
                },
            },
        }
    }
}

/// Response of `POST /licenses/actions/validate-key`.
#[derive(Debug, Deserialize)]
pub struct ValidateKeyResponse {
    pub meta: ValidationMeta,
    #[serde(default)]
    pub data: Option<LicenseData>,
}

#[derive(Debug, Deserialize)]
pub struct ValidationMeta {
    pub valid: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LicenseData {
    pub id: String,
    pub attributes: LicenseAttributes,
}

#[derive(Debug, Deserialize)]
pub struct LicenseAttributes {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expiry: Option<Timestamp>,
}

/// Error envelope the provider uses for non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub errors: Vec<ProviderErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderErrorEntry {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// machines
// ---------------------------------------------------------------------------

/// Body of `POST /machines`.
#[derive(Debug, Serialize)]
pub struct CreateMachineRequest {
    pub data: CreateMachineData,
}

#[derive(Debug, Serialize)]
pub struct CreateMachineData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: CreateMachineAttributes,
    pub relationships: CreateMachineRelationships,
}

#[derive(Debug, Serialize)]
pub struct CreateMachineAttributes {
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateMachineRelationships {
    pub license: RelationshipRef,
}

#[derive(Debug, Serialize)]
pub struct RelationshipRef {
    pub data: RelationshipData,
}

#[derive(Debug, Serialize)]
pub struct RelationshipData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
}

impl CreateMachineRequest {
    pub fn new(
        license_id: &str,
        fingerprint: &str,
        name: Option<&str>,
        platform: Option<&str>,
    ) -> Self {
        Self {
            data: CreateMachineData {
                kind: "machines",
                attributes: CreateMachineAttributes {
                    fingerprint: fingerprint.to_string(),
                    name: name.map(str::to_string),
                    platform: platform.map(str::to_string),
                },
                relationships: CreateMachineRelationships {
                    license: RelationshipRef {
                        data: RelationshipData {
                            kind: "licenses",
                            id: license_id.to_string(),
                        },
                    },
                },
            },
        }
    }
}

/// Response of `POST /machines`.
#[derive(Debug, Deserialize)]
pub struct MachineResponse {
    pub data: MachineData,
}

#[derive(Debug, Deserialize)]
pub struct MachineData {
    pub id: String,
    pub attributes: MachineAttributes,
}

#[derive(Debug, Deserialize)]
pub struct MachineAttributes {
    pub fingerprint: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub created: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Normalized results returned to the engine
// ---------------------------------------------------------------------------

/// A machine record created by `activate_device`.
#[derive(Debug, Clone)]
pub struct ActivatedMachine {
    pub machine_id: String,
    pub fingerprint: String,
    pub name: Option<String>,
    pub platform: Option<String>,
    pub created_at: Option<Timestamp>,
}

/// Normalized heartbeat result. A failed heartbeat is a value, not an
/// error: the self-heal path degrades gracefully on failure.
#[derive(Debug, Clone)]
pub struct HeartbeatStatus {
    pub success: bool,
    pub error: Option<String>,
}
