//! The `LicenseProvider` trait and its production HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use keyline_core::validation::{LicenseSnapshot, ValidationCode, ValidationOutcome};

use crate::credentials::CredentialCache;
use crate::error::ProviderError;
use crate::types::{
    ActivatedMachine, CreateMachineRequest, HeartbeatStatus, MachineResponse, ProviderErrorBody,
    ValidateKeyRequest, ValidateKeyResponse,
};

/// Upstream license provider operations, as consumed by the engine.
///
/// Injected as a trait object so tests can script outcomes without a
/// network. One network call per invocation; no retries at this layer.
#[async_trait]
pub trait LicenseProvider: Send + Sync {
    /// Validate a license key against a device fingerprint.
    ///
    /// Never errors for provider-reported invalidity; those come back as
    /// `ValidationOutcome { valid: false, .. }`. Errors mean transport
    /// or auth failure.
    async fn validate(
        &self,
        license_key: &str,
        fingerprint: &str,
    ) -> Result<ValidationOutcome, ProviderError>;

    /// Create a machine record binding `fingerprint` to `license_id`.
    ///
    /// Not idempotent at the provider: the engine guarantees at most one
    /// call per logical activation.
    async fn activate_device(
        &self,
        license_id: &str,
        fingerprint: &str,
        name: Option<&str>,
        platform: Option<&str>,
    ) -> Result<ActivatedMachine, ProviderError>;

    /// Delete a machine record. Returns `false` when the provider had
    /// already forgotten it (404), which callers treat as success.
    async fn deactivate_device(&self, machine_id: &str) -> Result<bool, ProviderError>;

    /// Send a heartbeat ping for a machine.
    async fn heartbeat(&self, machine_id: &str) -> Result<HeartbeatStatus, ProviderError>;
}

/// Production provider client over HTTP.
pub struct HttpLicenseProvider {
    client: reqwest::Client,
    base_url: String,
    credentials: CredentialCache,
}

impl HttpLicenseProvider {
    /// Create a client with a hard per-request timeout.
    ///
    /// * `base_url` - provider API root, without a trailing slash.
    pub fn new(
        base_url: String,
        credentials: CredentialCache,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ProviderError> {
        let token = self.credentials.get()?;
        let response = request.bearer_auth(token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // A stale cached token is the usual cause; the next request
            // will fetch fresh.
            self.credentials.invalidate();
        }
        Ok(response)
    }

    /// Read a non-2xx body and fail with the raw status/body.
    async fn api_error(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        ProviderError::Api { status, body }
    }

    /// Turn a validate-key response body into a normalized outcome.
    fn normalize_validation(parsed: ValidateKeyResponse) -> ValidationOutcome {
        let code = parsed
            .meta
            .code
            .as_deref()
            .map(ValidationCode::from_provider_str)
            .unwrap_or(if parsed.meta.valid {
                ValidationCode::Valid
            } else {
                ValidationCode::UnknownError
            });

        ValidationOutcome {
            valid: parsed.meta.valid,
            code,
            detail: parsed.meta.detail.unwrap_or_default(),
            license: parsed.data.map(|data| LicenseSnapshot {
                id: data.id,
                status: data.attributes.status,
                expiry: data.attributes.expiry,
            }),
        }
    }
}

#[async_trait]
impl LicenseProvider for HttpLicenseProvider {
    async fn validate(
        &self,
        license_key: &str,
        fingerprint: &str,
    ) -> Result<ValidationOutcome, ProviderError> {
        let request = self
            .client
            .post(format!("{}/licenses/actions/validate-key", self.base_url))
            .json(&ValidateKeyRequest::new(license_key, fingerprint));

        let response = self.send(request).await?;
        let status = response.status();

        if status.is_success() {
            let parsed: ValidateKeyResponse = response.json().await?;
            return Ok(Self::normalize_validation(parsed));
        }

        // The provider reports some invalid-key cases as 4xx with an
        // errors envelope. Those are validation outcomes, not transport
        // failures; only an unrecognizable body is a hard error.
        if status.is_client_error() && status != StatusCode::UNAUTHORIZED {
            let body = response.text().await?;
            if let Ok(parsed) = serde_json::from_str::<ProviderErrorBody>(&body) {
                if let Some(entry) = parsed.errors.into_iter().next() {
                    let code = entry
                        .code
                        .as_deref()
                        .map(ValidationCode::from_provider_str)
                        .unwrap_or(ValidationCode::UnknownError);
                    return Ok(ValidationOutcome {
                        valid: false,
                        code,
                        detail: entry.detail.unwrap_or_default(),
                        license: None,
                    });
                }
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Err(Self::api_error(response).await)
    }

    async fn activate_device(
        &self,
        license_id: &str,
        fingerprint: &str,
        name: Option<&str>,
        platform: Option<&str>,
    ) -> Result<ActivatedMachine, ProviderError> {
        let request = self
            .client
            .post(format!("{}/machines", self.base_url))
            .json(&CreateMachineRequest::new(
                license_id,
                fingerprint,
                name,
                platform,
            ));

        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let parsed: MachineResponse = response.json().await?;
        tracing::debug!(machine_id = %parsed.data.id, %license_id, "provider machine created");

        Ok(ActivatedMachine {
            machine_id: parsed.data.id,
            fingerprint: parsed.data.attributes.fingerprint,
            name: parsed.data.attributes.name,
            platform: parsed.data.attributes.platform,
            created_at: parsed.data.attributes.created,
        })
    }

    async fn deactivate_device(&self, machine_id: &str) -> Result<bool, ProviderError> {
        let request = self
            .client
            .delete(format!("{}/machines/{}", self.base_url, machine_id));

        let response = self.send(request).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            // Already gone. Deactivation is idempotent from the
            // caller's point of view.
            return Ok(false);
        }
        if !status.is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(true)
    }

    async fn heartbeat(&self, machine_id: &str) -> Result<HeartbeatStatus, ProviderError> {
        let request = self
            .client
            .post(format!("{}/machines/{}/actions/ping", self.base_url, machine_id));

        let response = self.send(request).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(HeartbeatStatus {
                success: true,
                error: None,
            });
        }

        // Heartbeat failure is a degraded state the engine handles, not
        // a transport error -- unless we cannot read the body at all.
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let detail = serde_json::from_str::<ProviderErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.errors.into_iter().next())
            .and_then(|entry| entry.detail)
            .unwrap_or_else(|| format!("heartbeat failed with status {}", status.as_u16()));

        Ok(HeartbeatStatus {
            success: false,
            error: Some(detail),
        })
    }
}
