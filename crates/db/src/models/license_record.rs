//! Local license record model.
//!
//! The provider owns license state; this table is a read-mostly mirror
//! created by the issuance process so `/license/check` can answer by
//! email without a provider round-trip.

use serde::Serialize;
use sqlx::FromRow;

use keyline_core::types::{DbId, Timestamp};

/// A mirrored license row from the `license_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    pub id: DbId,
    /// Provider-assigned license id.
    pub license_id: String,
    /// The opaque license key handed to the customer.
    pub license_key: String,
    pub owner_email: String,
    pub plan_name: Option<String>,
    /// Last-seen provider status (`ACTIVE`, `EXPIRED`, ...).
    pub status: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
