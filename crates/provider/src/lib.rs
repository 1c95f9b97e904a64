//! Client for the upstream license-validation provider.
//!
//! Wraps the provider's REST API (validate-key, machine activation,
//! deactivation, heartbeat ping) using [`reqwest`] and normalizes its
//! responses into the closed [`keyline_core::validation::ValidationCode`]
//! enumeration. Provider-reported invalidity is a normal outcome here;
//! only transport and auth failures surface as errors.

pub mod client;
pub mod credentials;
pub mod error;
pub mod types;

pub use client::{HttpLicenseProvider, LicenseProvider};
pub use credentials::{CredentialCache, StaticToken, TokenSource};
pub use error::ProviderError;
pub use types::{ActivatedMachine, HeartbeatStatus};
