//! Shared test fixtures: a scriptable fake provider, in-memory storage
//! seams, and an app/engine builder mirroring production wiring.

// Each test binary compiles this module; not every binary uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use keyline_api::auth::jwt::{Claims, JwtConfig};
use keyline_api::config::{EngineConfig, ServerConfig};
use keyline_api::engine::EntitlementEngine;
use keyline_api::ratelimit::FixedWindowLimiter;
use keyline_api::routes;
use keyline_api::state::AppState;
use keyline_core::validation::{LicenseSnapshot, ValidationCode, ValidationOutcome};
use keyline_db::directory::InMemoryLicenseDirectory;
use keyline_db::models::device_activation::DeviceActivation;
use keyline_db::models::license_record::LicenseRecord;
use keyline_db::registry::InMemoryDeviceRegistry;
use keyline_provider::{ActivatedMachine, HeartbeatStatus, LicenseProvider, ProviderError};

pub const TEST_JWT_SECRET: &str = "test-secret";

// ---------------------------------------------------------------------------
// Fake provider
// ---------------------------------------------------------------------------

/// One scripted response for a `validate` call.
pub enum ScriptedValidation {
    Outcome(ValidationOutcome),
    /// Simulates a transport-level failure (provider unreachable).
    Transport,
}

/// Scriptable [`LicenseProvider`] with call counters, so tests can pin
/// down exactly how many provider calls the engine makes.
pub struct FakeProvider {
    validations: Mutex<VecDeque<ScriptedValidation>>,
    pub validate_calls: AtomicUsize,
    pub activate_calls: AtomicUsize,
    pub deactivate_calls: AtomicUsize,
    pub heartbeat_calls: AtomicUsize,
    heartbeat_success: AtomicBool,
    activate_conflict: AtomicBool,
    deactivate_found: AtomicBool,
    machine_seq: AtomicUsize,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            validations: Mutex::new(VecDeque::new()),
            validate_calls: AtomicUsize::new(0),
            activate_calls: AtomicUsize::new(0),
            deactivate_calls: AtomicUsize::new(0),
            heartbeat_calls: AtomicUsize::new(0),
            heartbeat_success: AtomicBool::new(true),
            activate_conflict: AtomicBool::new(false),
            deactivate_found: AtomicBool::new(true),
            machine_seq: AtomicUsize::new(0),
        }
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next validate outcome.
    pub fn script(&self, response: ScriptedValidation) {
        self.validations.lock().unwrap().push_back(response);
    }

    pub fn script_outcome(&self, outcome: ValidationOutcome) {
        self.script(ScriptedValidation::Outcome(outcome));
    }

    /// Make subsequent heartbeats fail with the given flag.
    pub fn set_heartbeat_success(&self, success: bool) {
        self.heartbeat_success.store(success, Ordering::SeqCst);
    }

    /// Make the next activation fail with a provider-side conflict.
    pub fn set_activate_conflict(&self, conflict: bool) {
        self.activate_conflict.store(conflict, Ordering::SeqCst);
    }

    /// Make deactivations report 404 (machine already gone upstream).
    pub fn set_deactivate_found(&self, found: bool) {
        self.deactivate_found.store(found, Ordering::SeqCst);
    }
}

#[async_trait]
impl LicenseProvider for FakeProvider {
    async fn validate(
        &self,
        _license_key: &str,
        _fingerprint: &str,
    ) -> Result<ValidationOutcome, ProviderError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .validations
            .lock()
            .unwrap()
            .pop_front()
            .expect("FakeProvider: no validation scripted");
        match scripted {
            ScriptedValidation::Outcome(outcome) => Ok(outcome),
            ScriptedValidation::Transport => Err(ProviderError::Api {
                status: 503,
                body: "upstream unavailable".into(),
            }),
        }
    }

    async fn activate_device(
        &self,
        _license_id: &str,
        fingerprint: &str,
        name: Option<&str>,
        platform: Option<&str>,
    ) -> Result<ActivatedMachine, ProviderError> {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        if self.activate_conflict.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 422,
                body: "fingerprint already taken".into(),
            });
        }
        let n = self.machine_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ActivatedMachine {
            // Prefixed so minted ids never collide with seeded `mach_{n}` records.
            machine_id: format!("mach_minted_{n}"),
            fingerprint: fingerprint.to_string(),
            name: name.map(str::to_string),
            platform: platform.map(str::to_string),
            created_at: Some(Utc::now()),
        })
    }

    async fn deactivate_device(&self, _machine_id: &str) -> Result<bool, ProviderError> {
        self.deactivate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.deactivate_found.load(Ordering::SeqCst))
    }

    async fn heartbeat(&self, _machine_id: &str) -> Result<HeartbeatStatus, ProviderError> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        if self.heartbeat_success.load(Ordering::SeqCst) {
            Ok(HeartbeatStatus {
                success: true,
                error: None,
            })
        } else {
            Ok(HeartbeatStatus {
                success: false,
                error: Some("heartbeat window closed".into()),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome and record builders
// ---------------------------------------------------------------------------

pub fn snapshot(license_id: &str) -> LicenseSnapshot {
    LicenseSnapshot {
        id: license_id.to_string(),
        status: Some("ACTIVE".into()),
        expiry: Some(Utc::now() + Duration::days(365)),
    }
}

pub fn outcome(code: ValidationCode, license: Option<LicenseSnapshot>) -> ValidationOutcome {
    ValidationOutcome {
        valid: code == ValidationCode::Valid,
        code,
        detail: format!("scripted {code}"),
        license,
    }
}

/// A registry record seen `hours_ago` hours ago.
pub fn seen_activation(
    license_id: &str,
    fingerprint: &str,
    machine_id: &str,
    user_id: Option<&str>,
    hours_ago: i64,
) -> DeviceActivation {
    let seen = Utc::now() - Duration::hours(hours_ago);
    DeviceActivation {
        id: 0,
        license_id: license_id.to_string(),
        machine_id: Some(machine_id.to_string()),
        fingerprint: fingerprint.to_string(),
        user_id: user_id.map(str::to_string),
        user_email: user_id.map(|id| format!("{id}@example.com")),
        name: None,
        platform: None,
        created_at: seen - Duration::days(7),
        last_seen_at: Some(seen),
    }
}

pub fn license_record(license_id: &str, owner_email: &str, plan: Option<&str>) -> LicenseRecord {
    LicenseRecord {
        id: 0,
        license_id: license_id.to_string(),
        license_key: format!("key-{license_id}"),
        owner_email: owner_email.to_string(),
        plan_name: plan.map(str::to_string),
        status: Some("ACTIVE".into()),
        expires_at: Some(Utc::now() + Duration::days(365)),
        created_at: Utc::now() - Duration::days(30),
        updated_at: Utc::now() - Duration::days(1),
    }
}

// ---------------------------------------------------------------------------
// Engine / app builders
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub registry: Arc<InMemoryDeviceRegistry>,
    pub directory: Arc<InMemoryLicenseDirectory>,
    pub provider: Arc<FakeProvider>,
    pub engine: Arc<EntitlementEngine>,
}

/// Build an engine over in-memory storage and the fake provider, with
/// the default 2-hour concurrency window.
pub fn test_engine() -> TestHarness {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let directory = Arc::new(InMemoryLicenseDirectory::new());
    let provider = Arc::new(FakeProvider::new());
    let registry_seam: Arc<dyn keyline_db::registry::DeviceRegistry> = registry.clone();
    let directory_seam: Arc<dyn keyline_db::directory::LicenseDirectory> = directory.clone();
    let provider_seam: Arc<dyn LicenseProvider> = provider.clone();
    let engine = Arc::new(EntitlementEngine::new(
        registry_seam,
        directory_seam,
        provider_seam,
        2,
    ));
    TestHarness {
        registry,
        directory,
        provider,
        engine,
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
        },
        engine: EngineConfig {
            provider_url: "http://provider.invalid".to_string(),
            provider_token: "unused".to_string(),
            provider_timeout_secs: 10,
            provider_token_ttl_secs: 300,
            activation_window_hours: 2,
            check_rate_limit_per_min: 3,
        },
    }
}

/// Build the application router over the harness. The pool is lazy and
/// never connected; license handlers only touch the trait seams.
pub fn build_test_app(harness: &TestHarness) -> axum::Router {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/keyline_test")
        .expect("lazy pool");

    let config = test_config();
    let check_rate_limit = config.engine.check_rate_limit_per_min;
    let directory: Arc<dyn keyline_db::directory::LicenseDirectory> =
        harness.directory.clone();
    let state = AppState {
        pool,
        config: Arc::new(config),
        engine: Arc::clone(&harness.engine),
        directory,
        check_limiter: Arc::new(FixedWindowLimiter::new(check_rate_limit)),
    };

    axum::Router::new()
        .merge(routes::api_routes())
        .with_state(state)
}

/// Sign a bearer token the test config will accept.
pub fn bearer_token(user_id: &str, email: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: now + 300,
        iat: now,
        jti: uuid::Uuid::new_v4().to_string(),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}
