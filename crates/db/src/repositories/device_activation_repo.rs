//! Repository for the `device_activations` table.

use sqlx::PgPool;

use crate::models::device_activation::{CreateDeviceActivation, DeviceActivation};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, license_id, machine_id, fingerprint, user_id, user_email, \
                       name, platform, created_at, last_seen_at";

/// Provides CRUD operations for device activations.
pub struct DeviceActivationRepo;

impl DeviceActivationRepo {
    /// Insert a new activation, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateDeviceActivation,
    ) -> Result<DeviceActivation, sqlx::Error> {
        let query = format!(
            "INSERT INTO device_activations
                 (license_id, machine_id, fingerprint, user_id, user_email, name, platform)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeviceActivation>(&query)
            .bind(&input.license_id)
            .bind(&input.machine_id)
            .bind(&input.fingerprint)
            .bind(&input.user_id)
            .bind(&input.user_email)
            .bind(&input.name)
            .bind(&input.platform)
            .fetch_one(pool)
            .await
    }

    /// Find the activation for a (license, fingerprint) pair.
    pub async fn find_by_license_and_fingerprint(
        pool: &PgPool,
        license_id: &str,
        fingerprint: &str,
    ) -> Result<Option<DeviceActivation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM device_activations
             WHERE license_id = $1 AND fingerprint = $2"
        );
        sqlx::query_as::<_, DeviceActivation>(&query)
            .bind(license_id)
            .bind(fingerprint)
            .fetch_optional(pool)
            .await
    }

    /// Find an activation by its provider-assigned machine id.
    pub async fn find_by_machine_id(
        pool: &PgPool,
        machine_id: &str,
    ) -> Result<Option<DeviceActivation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM device_activations WHERE machine_id = $1"
        );
        sqlx::query_as::<_, DeviceActivation>(&query)
            .bind(machine_id)
            .fetch_optional(pool)
            .await
    }

    /// Stamp `last_seen_at` for a machine. Returns `true` if a row matched.
    pub async fn touch_last_seen(pool: &PgPool, machine_id: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE device_activations SET last_seen_at = NOW() WHERE machine_id = $1")
                .bind(machine_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the activation for a machine. Returns `true` if a row was
    /// removed, `false` if it was already gone.
    pub async fn delete_by_machine_id(
        pool: &PgPool,
        machine_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM device_activations WHERE machine_id = $1")
            .bind(machine_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All activations for a license, for concurrency-window scans.
    pub async fn list_for_license(
        pool: &PgPool,
        license_id: &str,
    ) -> Result<Vec<DeviceActivation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM device_activations WHERE license_id = $1"
        );
        sqlx::query_as::<_, DeviceActivation>(&query)
            .bind(license_id)
            .fetch_all(pool)
            .await
    }

    /// All activations for one user's seat on a license.
    pub async fn list_for_seat(
        pool: &PgPool,
        license_id: &str,
        user_id: &str,
    ) -> Result<Vec<DeviceActivation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM device_activations
             WHERE license_id = $1 AND user_id = $2"
        );
        sqlx::query_as::<_, DeviceActivation>(&query)
            .bind(license_id)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}
