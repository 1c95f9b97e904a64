//! Device activation model and DTOs.

use serde::Serialize;
use sqlx::FromRow;

use keyline_core::types::{DbId, Timestamp};

/// One device bound to one license, from the `device_activations` table.
///
/// Invariants (enforced by unique constraints): exactly one row per
/// (license_id, fingerprint) pair; a machine id, once assigned, is
/// unique across the table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceActivation {
    pub id: DbId,
    /// Provider-assigned license id.
    pub license_id: String,
    /// Provider-assigned machine id; absent until first activation
    /// round-trip completes.
    pub machine_id: Option<String>,
    /// Client-computed stable identifier for the physical device.
    pub fingerprint: String,
    /// Owning user, when the activation came through an authenticated
    /// caller. Legacy extension callers leave these empty.
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub name: Option<String>,
    pub platform: Option<String>,
    pub created_at: Timestamp,
    /// Updated on every validation/heartbeat; `None` if never seen.
    pub last_seen_at: Option<Timestamp>,
}

impl DeviceActivation {
    /// The timestamp used for concurrency-window membership:
    /// `last_seen_at`, falling back to `created_at` if never seen.
    pub fn effective_seen_at(&self) -> Timestamp {
        self.last_seen_at.unwrap_or(self.created_at)
    }
}

/// DTO for inserting a new device activation.
#[derive(Debug, Clone)]
pub struct CreateDeviceActivation {
    pub license_id: String,
    pub machine_id: Option<String>,
    pub fingerprint: String,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub name: Option<String>,
    pub platform: Option<String>,
}
