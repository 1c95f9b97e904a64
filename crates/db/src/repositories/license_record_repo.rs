//! Repository for the `license_records` mirror table.

use keyline_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::license_record::LicenseRecord;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, license_id, license_key, owner_email, plan_name, \
                       status, expires_at, created_at, updated_at";

/// Read and refresh operations for mirrored license records.
pub struct LicenseRecordRepo;

impl LicenseRecordRepo {
    /// All licenses owned by this email (case-insensitive), newest first.
    pub async fn list_for_owner_email(
        pool: &PgPool,
        email: &str,
    ) -> Result<Vec<LicenseRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM license_records
             WHERE lower(owner_email) = lower($1)
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, LicenseRecord>(&query)
            .bind(email)
            .fetch_all(pool)
            .await
    }

    /// Find a license by its provider-assigned id.
    pub async fn find_by_license_id(
        pool: &PgPool,
        license_id: &str,
    ) -> Result<Option<LicenseRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM license_records WHERE license_id = $1"
        );
        sqlx::query_as::<_, LicenseRecord>(&query)
            .bind(license_id)
            .fetch_optional(pool)
            .await
    }

    /// Refresh mirrored status/expiry after a successful validate call.
    ///
    /// Only touches rows that already exist; the issuance process (out
    /// of scope here) owns row creation.
    pub async fn refresh_snapshot(
        pool: &PgPool,
        license_id: &str,
        status: Option<&str>,
        expires_at: Option<Timestamp>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE license_records
             SET status = COALESCE($2, status),
                 expires_at = COALESCE($3, expires_at),
                 updated_at = NOW()
             WHERE license_id = $1",
        )
        .bind(license_id)
        .bind(status)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
