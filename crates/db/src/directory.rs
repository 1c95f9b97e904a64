//! The `LicenseDirectory` seam over the local license mirror.
//!
//! Serves the check-by-email endpoint and the engine's plan lookup.
//! License state is owned by the upstream provider; this directory only
//! reads the local mirror and refreshes its status/expiry snapshot.

use async_trait::async_trait;

use keyline_core::error::CoreError;
use keyline_core::types::Timestamp;

use crate::models::license_record::LicenseRecord;
use crate::DbPool;

/// Read and refresh access to mirrored license records.
#[async_trait]
pub trait LicenseDirectory: Send + Sync {
    /// All licenses owned by this email, newest first.
    async fn licenses_for_email(&self, email: &str) -> Result<Vec<LicenseRecord>, CoreError>;

    /// Lookup by provider-assigned license id.
    async fn find_by_license_id(
        &self,
        license_id: &str,
    ) -> Result<Option<LicenseRecord>, CoreError>;

    /// Refresh mirrored status/expiry after a validate call. A missing
    /// row is not an error; issuance owns row creation.
    async fn refresh_snapshot(
        &self,
        license_id: &str,
        status: Option<&str>,
        expires_at: Option<Timestamp>,
    ) -> Result<(), CoreError>;
}

fn storage_err(err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("license directory query failed: {err}"))
}

/// Postgres-backed directory delegating to [`crate::repositories::LicenseRecordRepo`].
pub struct PgLicenseDirectory {
    pool: DbPool,
}

impl PgLicenseDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LicenseDirectory for PgLicenseDirectory {
    async fn licenses_for_email(&self, email: &str) -> Result<Vec<LicenseRecord>, CoreError> {
        crate::repositories::LicenseRecordRepo::list_for_owner_email(&self.pool, email)
            .await
            .map_err(storage_err)
    }

    async fn find_by_license_id(
        &self,
        license_id: &str,
    ) -> Result<Option<LicenseRecord>, CoreError> {
        crate::repositories::LicenseRecordRepo::find_by_license_id(&self.pool, license_id)
            .await
            .map_err(storage_err)
    }

    async fn refresh_snapshot(
        &self,
        license_id: &str,
        status: Option<&str>,
        expires_at: Option<Timestamp>,
    ) -> Result<(), CoreError> {
        crate::repositories::LicenseRecordRepo::refresh_snapshot(
            &self.pool, license_id, status, expires_at,
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

/// In-memory directory for engine tests.
#[derive(Default)]
pub struct InMemoryLicenseDirectory {
    rows: std::sync::Mutex<Vec<LicenseRecord>>,
}

impl InMemoryLicenseDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a mirrored license record. Test setup helper.
    pub fn seed(&self, record: LicenseRecord) {
        self.rows.lock().unwrap().push(record);
    }
}

#[async_trait]
impl LicenseDirectory for InMemoryLicenseDirectory {
    async fn licenses_for_email(&self, email: &str) -> Result<Vec<LicenseRecord>, CoreError> {
        let mut records: Vec<LicenseRecord> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_email.eq_ignore_ascii_case(email))
            .cloned()
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        Ok(records)
    }

    async fn find_by_license_id(
        &self,
        license_id: &str,
    ) -> Result<Option<LicenseRecord>, CoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.license_id == license_id)
            .cloned())
    }

    async fn refresh_snapshot(
        &self,
        license_id: &str,
        status: Option<&str>,
        expires_at: Option<Timestamp>,
    ) -> Result<(), CoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.license_id == license_id) {
            if let Some(status) = status {
                row.status = Some(status.to_string());
            }
            if expires_at.is_some() {
                row.expires_at = expires_at;
            }
            row.updated_at = chrono::Utc::now();
        }
        Ok(())
    }
}
