//! Instance-owned credential cache for provider auth tokens.
//!
//! The cache is injected into each [`crate::HttpLicenseProvider`]
//! instance rather than living in process-global state, so tests and
//! multi-tenant deployments never share mutable credentials.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ProviderError;

/// Supplies a fresh provider token when the cache is empty or expired.
pub trait TokenSource: Send + Sync {
    fn fetch(&self) -> Result<String, ProviderError>;
}

/// A fixed token from configuration. The common production source: the
/// provider token is an environment secret with no rotation endpoint.
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn fetch(&self) -> Result<String, ProviderError> {
        if self.0.is_empty() {
            return Err(ProviderError::Credential(
                "provider token is empty".into(),
            ));
        }
        Ok(self.0.clone())
    }
}

/// TTL-bound token cache with explicit invalidation.
pub struct CredentialCache {
    source: Box<dyn TokenSource>,
    ttl: Duration,
    cached: Mutex<Option<(String, Instant)>>,
}

impl CredentialCache {
    pub fn new(source: Box<dyn TokenSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached token, fetching a fresh one if the cache is
    /// empty or past its TTL.
    pub fn get(&self) -> Result<String, ProviderError> {
        let mut cached = self.cached.lock().unwrap();
        if let Some((token, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(token.clone());
            }
        }
        let token = self.source.fetch()?;
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }

    /// Drop the cached token. The next [`CredentialCache::get`] fetches
    /// fresh. Called after the provider rejects a request as
    /// unauthorized.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap() = None;
    }
}
