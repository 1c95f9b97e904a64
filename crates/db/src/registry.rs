//! The `DeviceRegistry` seam between the activation engine and storage.
//!
//! The engine only sees this trait. Production uses [`PgDeviceRegistry`]
//! over the repository layer; tests use [`InMemoryDeviceRegistry`] so
//! engine behavior can be exercised without a database.

use async_trait::async_trait;

use keyline_core::error::CoreError;
use keyline_core::policy::QuotaScope;

use crate::models::device_activation::{CreateDeviceActivation, DeviceActivation};
use crate::DbPool;

/// Persistent store of device-activation records.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Point lookup by (license id, fingerprint).
    async fn find_by_fingerprint(
        &self,
        license_id: &str,
        fingerprint: &str,
    ) -> Result<Option<DeviceActivation>, CoreError>;

    /// Point lookup by provider-assigned machine id.
    async fn find_by_machine_id(
        &self,
        machine_id: &str,
    ) -> Result<Option<DeviceActivation>, CoreError>;

    /// Persist a new activation.
    ///
    /// `authenticated` callers must supply non-empty `user_id` and
    /// `user_email`; violating this rejects the insert so per-seat
    /// accounting can never silently degrade to per-license accounting.
    async fn insert(
        &self,
        input: CreateDeviceActivation,
        authenticated: bool,
    ) -> Result<DeviceActivation, CoreError>;

    /// Remove the record for a machine. Returns `false` if already gone.
    async fn remove_by_machine_id(&self, machine_id: &str) -> Result<bool, CoreError>;

    /// Stamp `last_seen_at` for a machine (validation/heartbeat liveness).
    async fn touch_last_seen(&self, machine_id: &str) -> Result<(), CoreError>;

    /// All records in a quota scope, unfiltered by time. The concurrency
    /// window counter applies the cutoff.
    async fn scope_records(&self, scope: &QuotaScope) -> Result<Vec<DeviceActivation>, CoreError>;
}

/// Reject an authenticated insert with missing owning identity.
fn ensure_owned_identity(
    input: &CreateDeviceActivation,
    authenticated: bool,
) -> Result<(), CoreError> {
    if !authenticated {
        return Ok(());
    }
    let user_id_ok = input.user_id.as_deref().is_some_and(|id| !id.is_empty());
    let email_ok = input
        .user_email
        .as_deref()
        .is_some_and(|email| !email.is_empty());
    if user_id_ok && email_ok {
        Ok(())
    } else {
        Err(CoreError::Validation(
            "authenticated activation requires a user id and email".into(),
        ))
    }
}

fn storage_err(err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("device registry query failed: {err}"))
}

/// Postgres-backed registry delegating to [`crate::repositories::DeviceActivationRepo`].
pub struct PgDeviceRegistry {
    pool: DbPool,
}

impl PgDeviceRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn find_by_fingerprint(
        &self,
        license_id: &str,
        fingerprint: &str,
    ) -> Result<Option<DeviceActivation>, CoreError> {
        crate::repositories::DeviceActivationRepo::find_by_license_and_fingerprint(
            &self.pool,
            license_id,
            fingerprint,
        )
        .await
        .map_err(storage_err)
    }

    async fn find_by_machine_id(
        &self,
        machine_id: &str,
    ) -> Result<Option<DeviceActivation>, CoreError> {
        crate::repositories::DeviceActivationRepo::find_by_machine_id(&self.pool, machine_id)
            .await
            .map_err(storage_err)
    }

    async fn insert(
        &self,
        input: CreateDeviceActivation,
        authenticated: bool,
    ) -> Result<DeviceActivation, CoreError> {
        ensure_owned_identity(&input, authenticated)?;
        crate::repositories::DeviceActivationRepo::create(&self.pool, &input)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                    CoreError::Conflict(format!(
                        "device already recorded for license {}",
                        input.license_id
                    ))
                }
                _ => storage_err(err),
            })
    }

    async fn remove_by_machine_id(&self, machine_id: &str) -> Result<bool, CoreError> {
        crate::repositories::DeviceActivationRepo::delete_by_machine_id(&self.pool, machine_id)
            .await
            .map_err(storage_err)
    }

    async fn touch_last_seen(&self, machine_id: &str) -> Result<(), CoreError> {
        crate::repositories::DeviceActivationRepo::touch_last_seen(&self.pool, machine_id)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn scope_records(&self, scope: &QuotaScope) -> Result<Vec<DeviceActivation>, CoreError> {
        let records = match scope {
            QuotaScope::PerLicense { license_id } => {
                crate::repositories::DeviceActivationRepo::list_for_license(&self.pool, license_id)
                    .await
            }
            QuotaScope::PerSeat {
                license_id,
                user_id,
            } => {
                crate::repositories::DeviceActivationRepo::list_for_seat(
                    &self.pool, license_id, user_id,
                )
                .await
            }
        };
        records.map_err(storage_err)
    }
}

/// In-memory registry for engine tests. Mirrors the Postgres unique
/// constraints on (license_id, fingerprint) and machine_id.
#[derive(Default)]
pub struct InMemoryDeviceRegistry {
    rows: std::sync::Mutex<Vec<DeviceActivation>>,
    next_id: std::sync::atomic::AtomicI64,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the identity guard. Test setup
    /// helper for pre-existing activations.
    pub fn seed(&self, record: DeviceActivation) {
        self.rows.lock().unwrap().push(record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn find_by_fingerprint(
        &self,
        license_id: &str,
        fingerprint: &str,
    ) -> Result<Option<DeviceActivation>, CoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.license_id == license_id && r.fingerprint == fingerprint)
            .cloned())
    }

    async fn find_by_machine_id(
        &self,
        machine_id: &str,
    ) -> Result<Option<DeviceActivation>, CoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.machine_id.as_deref() == Some(machine_id))
            .cloned())
    }

    async fn insert(
        &self,
        input: CreateDeviceActivation,
        authenticated: bool,
    ) -> Result<DeviceActivation, CoreError> {
        ensure_owned_identity(&input, authenticated)?;

        let mut rows = self.rows.lock().unwrap();
        let duplicate = rows.iter().any(|r| {
            (r.license_id == input.license_id && r.fingerprint == input.fingerprint)
                || (input.machine_id.is_some() && r.machine_id == input.machine_id)
        });
        if duplicate {
            return Err(CoreError::Conflict(format!(
                "device already recorded for license {}",
                input.license_id
            )));
        }

        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        let record = DeviceActivation {
            id,
            license_id: input.license_id,
            machine_id: input.machine_id,
            fingerprint: input.fingerprint,
            user_id: input.user_id,
            user_email: input.user_email,
            name: input.name,
            platform: input.platform,
            created_at: chrono::Utc::now(),
            last_seen_at: None,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn remove_by_machine_id(&self, machine_id: &str) -> Result<bool, CoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.machine_id.as_deref() != Some(machine_id));
        Ok(rows.len() < before)
    }

    async fn touch_last_seen(&self, machine_id: &str) -> Result<(), CoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .iter_mut()
            .find(|r| r.machine_id.as_deref() == Some(machine_id))
        {
            row.last_seen_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn scope_records(&self, scope: &QuotaScope) -> Result<Vec<DeviceActivation>, CoreError> {
        let rows = self.rows.lock().unwrap();
        let records = rows
            .iter()
            .filter(|r| match scope {
                QuotaScope::PerLicense { license_id } => r.license_id == *license_id,
                QuotaScope::PerSeat {
                    license_id,
                    user_id,
                } => r.license_id == *license_id && r.user_id.as_deref() == Some(user_id),
            })
            .cloned()
            .collect();
        Ok(records)
    }
}
