//! Time-windowed concurrency counting.
//!
//! A device counts as "active" for quota purposes when its last-seen
//! timestamp (falling back to creation time if it never checked in)
//! falls strictly inside the trailing window. Stale records are only
//! excluded from the count, never deleted. The set is recomputed on
//! every request; always-fresh enforcement is worth the rescan.

use std::sync::Arc;

use keyline_core::error::CoreError;
use keyline_core::policy::QuotaScope;
use keyline_core::types::Timestamp;
use keyline_db::models::device_activation::DeviceActivation;
use keyline_db::registry::DeviceRegistry;

/// Computes the set of devices considered active within a scope.
pub struct ConcurrencyWindowCounter {
    registry: Arc<dyn DeviceRegistry>,
    window_hours: i64,
}

impl ConcurrencyWindowCounter {
    pub fn new(registry: Arc<dyn DeviceRegistry>, window_hours: i64) -> Self {
        Self {
            registry,
            window_hours,
        }
    }

    /// All devices in `scope` seen strictly after `now - window`.
    pub async fn active_devices(
        &self,
        scope: &QuotaScope,
    ) -> Result<Vec<DeviceActivation>, CoreError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::hours(self.window_hours);
        let records = self.registry.scope_records(scope).await?;
        Ok(filter_active(records, cutoff))
    }
}

/// Keep records seen strictly after the cutoff. A record exactly at the
/// cutoff boundary is excluded.
pub fn filter_active(records: Vec<DeviceActivation>, cutoff: Timestamp) -> Vec<DeviceActivation> {
    records
        .into_iter()
        .filter(|record| record.effective_seen_at() > cutoff)
        .collect()
}
