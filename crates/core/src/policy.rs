//! Plan-to-quota entitlement policy.
//!
//! Pure lookup from a plan name to its device quota. Unknown or missing
//! plan names fall back to the most conservative tier so a misconfigured
//! plan never silently grants unlimited devices.

/// Plan name used when a license carries no plan information.
pub const DEFAULT_PLAN: &str = "Individual";

/// Device quota for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanQuota {
    /// `true` -> the limit applies per user seat; `false` -> per license.
    pub per_seat: bool,
    /// Maximum concurrently-active devices. `None` means unlimited.
    pub limit: Option<i32>,
}

/// Resolve the device quota for a plan name.
///
/// Matching is case-insensitive on the plan's leading word, so
/// `"Business (annual)"` resolves the Business tier.
pub fn quota_for(plan_name: &str) -> PlanQuota {
    let tier = plan_name
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();

    match tier.as_str() {
        "individual" => PlanQuota {
            per_seat: false,
            limit: Some(3),
        },
        "team" => PlanQuota {
            per_seat: true,
            limit: Some(3),
        },
        "business" => PlanQuota {
            per_seat: true,
            limit: Some(5),
        },
        "enterprise" => PlanQuota {
            per_seat: true,
            limit: None,
        },
        // Unknown plans get the Individual tier, never unlimited.
        _ => PlanQuota {
            per_seat: false,
            limit: Some(3),
        },
    }
}

/// The scope a quota is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaScope {
    /// All devices on the license share one allowance.
    PerLicense { license_id: String },
    /// Each user on the license has their own allowance.
    PerSeat {
        license_id: String,
        user_id: String,
    },
}
