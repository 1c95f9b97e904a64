//! The entitlement engine: activation, deactivation, and the
//! concurrency-window counter that backs quota decisions.
//!
//! The engine talks to storage and the upstream provider only through
//! the [`DeviceRegistry`], [`LicenseDirectory`], and [`LicenseProvider`]
//! traits, so its decision logic is testable without a database or a
//! network.

pub mod activation;
pub mod deactivation;
pub mod window;

use std::sync::Arc;

use keyline_db::directory::LicenseDirectory;
use keyline_db::registry::DeviceRegistry;
use keyline_provider::LicenseProvider;

use window::ConcurrencyWindowCounter;

/// Verified identity of the caller, carried from the auth extractor.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: String,
    pub email: String,
}

/// Orchestrates activation and deactivation against the provider and
/// the local registry.
pub struct EntitlementEngine {
    registry: Arc<dyn DeviceRegistry>,
    directory: Arc<dyn LicenseDirectory>,
    provider: Arc<dyn LicenseProvider>,
    window: ConcurrencyWindowCounter,
}

impl EntitlementEngine {
    /// * `window_hours` - trailing concurrency window for quota counting.
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        directory: Arc<dyn LicenseDirectory>,
        provider: Arc<dyn LicenseProvider>,
        window_hours: i64,
    ) -> Self {
        let window = ConcurrencyWindowCounter::new(Arc::clone(&registry), window_hours);
        Self {
            registry,
            directory,
            provider,
            window,
        }
    }
}
