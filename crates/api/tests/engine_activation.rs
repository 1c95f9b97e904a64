//! Activation engine behavior against in-memory storage and a scripted
//! fake provider: idempotence, self-heal, quota enforcement, and the
//! rejection taxonomy.

mod common;

use std::sync::atomic::Ordering;

use assert_matches::assert_matches;

use keyline_core::decision::{EnforcementMode, EntitlementDecision, RejectionCode};
use keyline_core::validation::ValidationCode;
use keyline_db::models::device_activation::CreateDeviceActivation;
use keyline_db::registry::DeviceRegistry;

use common::{
    license_record, outcome, seen_activation, snapshot, test_engine, ScriptedValidation,
};

fn request(license_key: &str, fingerprint: &str) -> keyline_api::engine::activation::ActivationRequest {
    keyline_api::engine::activation::ActivationRequest {
        license_key: license_key.to_string(),
        fingerprint: fingerprint.to_string(),
        device_name: Some("Work laptop".to_string()),
        platform: Some("darwin".to_string()),
    }
}

#[tokio::test]
async fn fresh_activation_creates_one_machine_and_records_it() {
    let harness = test_engine();
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));

    let decision = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::Activated {
            device_count: 1,
            over_limit: false,
            ..
        }
    );
    assert_eq!(harness.provider.activate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.registry.len(), 1);

    let record = harness
        .registry
        .find_by_fingerprint("lic_1", "fp-1")
        .await
        .unwrap()
        .expect("activation recorded");
    assert!(record.machine_id.is_some());
    // Post-activation heartbeat succeeded, so liveness is stamped.
    assert!(record.last_seen_at.is_some());
}

#[tokio::test]
async fn second_activate_is_idempotent_and_makes_no_second_machine() {
    let harness = test_engine();
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));
    harness
        .provider
        .script_outcome(outcome(ValidationCode::Valid, Some(snapshot("lic_1"))));

    let first = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();
    let machine_id = assert_matches!(first, EntitlementDecision::Activated { machine_id, .. } => machine_id);

    let second = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    assert_matches!(
        second,
        EntitlementDecision::AlreadyActivated {
            machine_id: Some(id),
            effective_valid: false,
            ..
        } if id == machine_id
    );
    assert_eq!(harness.provider.activate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.registry.len(), 1);
}

#[tokio::test]
async fn self_heal_issues_heartbeat_and_reports_effective_valid() {
    let harness = test_engine();
    harness
        .registry
        .seed(seen_activation("lic_1", "fp-1", "mach_existing", None, 5));
    harness.provider.script_outcome(outcome(
        ValidationCode::HeartbeatNotStarted,
        Some(snapshot("lic_1")),
    ));

    let decision = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::AlreadyActivated {
            machine_id: Some(id),
            effective_valid: true,
            ..
        } if id == "mach_existing"
    );
    assert_eq!(harness.provider.heartbeat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.provider.activate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_self_heal_rejects_but_exposes_the_machine_id() {
    let harness = test_engine();
    harness
        .registry
        .seed(seen_activation("lic_1", "fp-1", "mach_existing", None, 5));
    harness.provider.set_heartbeat_success(false);
    harness.provider.script_outcome(outcome(
        ValidationCode::HeartbeatNotStarted,
        Some(snapshot("lic_1")),
    ));

    let decision = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::Rejected {
            code: RejectionCode::Provider(ValidationCode::HeartbeatNotStarted),
            machine_id: Some(id),
            ..
        } if id == "mach_existing"
    );
}

#[tokio::test]
async fn heartbeat_pending_without_local_record_rejects_without_machine_id() {
    let harness = test_engine();
    harness.provider.script_outcome(outcome(
        ValidationCode::HeartbeatNotStarted,
        Some(snapshot("lic_1")),
    ));

    let decision = harness
        .engine
        .activate(&request("key-1", "fp-unknown"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::Rejected {
            code: RejectionCode::Provider(ValidationCode::HeartbeatNotStarted),
            machine_id: None,
            ..
        }
    );
    assert_eq!(harness.provider.heartbeat_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_license_is_rejected_with_no_side_effects() {
    let harness = test_engine();
    harness
        .provider
        .script_outcome(outcome(ValidationCode::Expired, Some(snapshot("lic_1"))));

    let decision = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::Rejected {
            code: RejectionCode::Provider(ValidationCode::Expired),
            ..
        }
    );
    assert_eq!(harness.provider.activate_calls.load(Ordering::SeqCst), 0);
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn activatable_outcome_without_license_data_is_rejected() {
    let harness = test_engine();
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, None));

    let decision = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::Rejected {
            code: RejectionCode::LicenseDataMissing,
            ..
        }
    );
    assert_eq!(harness.provider.activate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provider_transport_failure_is_an_error_not_a_rejection() {
    let harness = test_engine();
    harness.provider.script(ScriptedValidation::Transport);

    let result = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await;

    assert!(result.is_err());
    assert_eq!(harness.provider.activate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blank_input_is_rejected_before_any_provider_call() {
    let harness = test_engine();

    let missing_key = harness
        .engine
        .activate(&request("  ", "fp-1"), None, EnforcementMode::Soft)
        .await;
    assert!(missing_key.is_err());

    let missing_fp = harness
        .engine
        .activate(&request("key-1", ""), None, EnforcementMode::Soft)
        .await;
    assert!(missing_fp.is_err());

    assert_eq!(harness.provider.validate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn soft_mode_activates_past_the_limit_with_over_limit_flag() {
    let harness = test_engine();
    // Individual plan: 3 devices per license. Three are already active.
    for n in 0..3 {
        harness.registry.seed(seen_activation(
            "lic_1",
            &format!("fp-old-{n}"),
            &format!("mach_old_{n}"),
            None,
            1,
        ));
    }
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));

    let decision = harness
        .engine
        .activate(&request("key-1", "fp-new"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::Activated {
            device_count: 4,
            max_devices: Some(3),
            over_limit: true,
            ..
        }
    );
    assert_eq!(harness.provider.activate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn under_limit_activation_is_not_flagged() {
    let harness = test_engine();
    for n in 0..2 {
        harness.registry.seed(seen_activation(
            "lic_1",
            &format!("fp-old-{n}"),
            &format!("mach_old_{n}"),
            None,
            1,
        ));
    }
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));

    let decision = harness
        .engine
        .activate(&request("key-1", "fp-new"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::Activated {
            device_count: 3,
            over_limit: false,
            ..
        }
    );
}

#[tokio::test]
async fn devices_outside_the_window_do_not_count_against_the_quota() {
    let harness = test_engine();
    // Seen 1h ago: inside the 2h window. Seen 3h ago (twice): outside.
    harness
        .registry
        .seed(seen_activation("lic_1", "fp-live", "mach_live", None, 1));
    harness
        .registry
        .seed(seen_activation("lic_1", "fp-idle-1", "mach_idle_1", None, 3));
    harness
        .registry
        .seed(seen_activation("lic_1", "fp-idle-2", "mach_idle_2", None, 3));
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));

    let decision = harness
        .engine
        .activate(&request("key-1", "fp-new"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    // Only mach_live counted, so the new device is the second active one.
    assert_matches!(
        decision,
        EntitlementDecision::Activated {
            device_count: 2,
            over_limit: false,
            ..
        }
    );
}

#[tokio::test]
async fn hard_mode_refuses_over_quota_per_seat_activation() {
    let harness = test_engine();
    harness
        .directory
        .seed(license_record("lic_biz", "owner@example.com", Some("Business")));
    // Business plan: 5 per seat. user_1's seat is full.
    for n in 0..5 {
        harness.registry.seed(seen_activation(
            "lic_biz",
            &format!("fp-u1-{n}"),
            &format!("mach_u1_{n}"),
            Some("user_1"),
            1,
        ));
    }
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_biz"))));

    let identity = keyline_api::engine::CallerIdentity {
        user_id: "user_1".to_string(),
        email: "user_1@example.com".to_string(),
    };
    let decision = harness
        .engine
        .activate(
            &request("key-biz", "fp-u1-new"),
            Some(&identity),
            EnforcementMode::Hard,
        )
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::QuotaExceeded {
            device_count: 5,
            max_devices: 5,
            ..
        }
    );
    // The quota gate fires before the provider is asked for a machine.
    assert_eq!(harness.provider.activate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.registry.len(), 5);
}

#[tokio::test]
async fn per_seat_quota_is_isolated_between_users() {
    let harness = test_engine();
    harness
        .directory
        .seed(license_record("lic_biz", "owner@example.com", Some("Business")));
    for n in 0..5 {
        harness.registry.seed(seen_activation(
            "lic_biz",
            &format!("fp-u1-{n}"),
            &format!("mach_u1_{n}"),
            Some("user_1"),
            1,
        ));
    }
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_biz"))));

    // user_2's seat is empty, so a full user_1 seat must not block them.
    let identity = keyline_api::engine::CallerIdentity {
        user_id: "user_2".to_string(),
        email: "user_2@example.com".to_string(),
    };
    let decision = harness
        .engine
        .activate(
            &request("key-biz", "fp-u2-1"),
            Some(&identity),
            EnforcementMode::Hard,
        )
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::Activated {
            device_count: 1,
            max_devices: Some(5),
            over_limit: false,
            ..
        }
    );
}

#[tokio::test]
async fn enterprise_plan_is_never_quota_limited() {
    let harness = test_engine();
    harness
        .directory
        .seed(license_record("lic_ent", "owner@example.com", Some("Enterprise")));
    for n in 0..20 {
        harness.registry.seed(seen_activation(
            "lic_ent",
            &format!("fp-{n}"),
            &format!("mach_{n}"),
            Some("user_1"),
            1,
        ));
    }
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_ent"))));

    let identity = keyline_api::engine::CallerIdentity {
        user_id: "user_1".to_string(),
        email: "user_1@example.com".to_string(),
    };
    let decision = harness
        .engine
        .activate(
            &request("key-ent", "fp-new"),
            Some(&identity),
            EnforcementMode::Hard,
        )
        .await
        .unwrap();

    assert_matches!(
        decision,
        EntitlementDecision::Activated {
            device_count: 21,
            max_devices: None,
            over_limit: false,
            ..
        }
    );
}

#[tokio::test]
async fn authenticated_identity_is_persisted_on_the_record() {
    let harness = test_engine();
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));

    let identity = keyline_api::engine::CallerIdentity {
        user_id: "user_1".to_string(),
        email: "user_1@example.com".to_string(),
    };
    harness
        .engine
        .activate(&request("key-1", "fp-1"), Some(&identity), EnforcementMode::Hard)
        .await
        .unwrap();

    let record = harness
        .registry
        .find_by_fingerprint("lic_1", "fp-1")
        .await
        .unwrap()
        .expect("activation recorded");
    assert_eq!(record.user_id.as_deref(), Some("user_1"));
    assert_eq!(record.user_email.as_deref(), Some("user_1@example.com"));
}

#[tokio::test]
async fn claimed_identity_with_blank_user_id_fails_the_activation() {
    let harness = test_engine();
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));

    let identity = keyline_api::engine::CallerIdentity {
        user_id: String::new(),
        email: "user_1@example.com".to_string(),
    };
    let result = harness
        .engine
        .activate(&request("key-1", "fp-1"), Some(&identity), EnforcementMode::Hard)
        .await;

    // The registry's identity guard refuses the insert.
    assert!(result.is_err());
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn validate_refreshes_the_local_license_mirror() {
    let harness = test_engine();
    let mut stale = license_record("lic_1", "owner@example.com", Some("Individual"));
    stale.status = Some("SUSPENDED".to_string());
    harness.directory.seed(stale);
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));

    harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    use keyline_db::directory::LicenseDirectory;
    let refreshed = harness
        .directory
        .find_by_license_id("lic_1")
        .await
        .unwrap()
        .expect("mirror row");
    assert_eq!(refreshed.status.as_deref(), Some("ACTIVE"));
}

#[tokio::test]
async fn poll_loop_confirms_only_after_machine_id_is_known() {
    use keyline_core::poll::activation_confirmed;

    let harness = test_engine();
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));
    harness
        .provider
        .script_outcome(outcome(ValidationCode::Valid, Some(snapshot("lic_1"))));

    // A valid outcome with no known machine id must not confirm.
    assert!(!activation_confirmed(true, None));

    harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();

    let second = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await
        .unwrap();
    let machine_id = assert_matches!(
        second,
        EntitlementDecision::AlreadyActivated { machine_id, .. } => machine_id
    );
    assert!(activation_confirmed(true, machine_id.as_deref()));
}

#[tokio::test]
async fn insert_conflict_surfaces_as_an_error_after_upstream_activation() {
    let harness = test_engine();
    // A record already claims the fingerprint locally but the provider
    // still reports the key unbound, so the engine proceeds to activate
    // and then hits the registry's unique constraint.
    harness
        .registry
        .insert(
            CreateDeviceActivation {
                license_id: "lic_1".to_string(),
                machine_id: Some("mach_prior".to_string()),
                fingerprint: "fp-1".to_string(),
                user_id: None,
                user_email: None,
                name: None,
                platform: None,
            },
            false,
        )
        .await
        .unwrap();
    harness
        .provider
        .script_outcome(outcome(ValidationCode::NoMachines, Some(snapshot("lic_1"))));

    let result = harness
        .engine
        .activate(&request("key-1", "fp-1"), None, EnforcementMode::Soft)
        .await;

    assert!(result.is_err());
    assert_eq!(harness.provider.activate_calls.load(Ordering::SeqCst), 1);
}
