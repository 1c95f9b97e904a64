//! The poll-safety contract shared with device-side callers.
//!
//! A polling caller may only treat a validation response as "activation
//! confirmed" when the response is valid AND carries a non-empty machine
//! id. Checking `valid` alone is the canonical regression this engine
//! exists to prevent: a response can be valid while the machine record
//! is still settling, and acting on it strands the device half-bound.

/// Whether a validation response confirms a completed activation.
///
/// Both conditions must hold: `valid` (including self-healed
/// `effective_valid`) and a non-empty machine id. Anything else means
/// "not yet ready, keep polling".
pub fn activation_confirmed(valid: bool, machine_id: Option<&str>) -> bool {
    valid && machine_id.is_some_and(|id| !id.is_empty())
}
