//! Errors from the provider client layer.
//!
//! These are transport-level failures only. A license the provider
//! rejects as expired or unknown is NOT an error; it comes back as a
//! `ValidationOutcome` with `valid: false`. Conflating the two would
//! tell a legitimate customer their license is invalid whenever the
//! provider has a bad day.

/// Errors from the provider REST client.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status we could not normalize.
    #[error("provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// No credential could be produced for the request.
    #[error("provider credential unavailable: {0}")]
    Credential(String),
}

impl ProviderError {
    /// Whether this error is a provider-side conflict on machine
    /// creation (e.g. duplicate fingerprint). Surfaced to callers as
    /// HTTP 422 rather than a generic upstream failure.
    pub fn is_activation_conflict(&self) -> bool {
        matches!(
            self,
            Self::Api {
                status: 409 | 422,
                ..
            }
        )
    }
}
