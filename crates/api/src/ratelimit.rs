//! Fixed-window in-memory rate limiter for the public check endpoint.
//!
//! Per-key request counting in one-minute windows. State is
//! process-local; a multi-instance deployment rate-limits per instance,
//! which is acceptable for an abuse brake on an unauthenticated lookup.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Keep the map from growing unboundedly under key churn.
const PRUNE_THRESHOLD: usize = 10_000;

/// Fixed-window counter keyed by an arbitrary string (here: the email
/// being checked).
pub struct FixedWindowLimiter {
    max_per_window: u32,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl FixedWindowLimiter {
    pub fn new(max_per_window: u32) -> Self {
        Self {
            max_per_window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `key`. Returns `false` when the key has
    /// exhausted its budget for the current window.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, (started, _)| now.duration_since(*started) < WINDOW);
        }

        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= WINDOW {
            *entry = (now, 0);
        }
        if entry.1 >= self.max_per_window {
            return false;
        }
        entry.1 += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_budget_then_blocks() {
        let limiter = FixedWindowLimiter::new(3);
        assert!(limiter.allow("a@example.com"));
        assert!(limiter.allow("a@example.com"));
        assert!(limiter.allow("a@example.com"));
        assert!(!limiter.allow("a@example.com"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = FixedWindowLimiter::new(1);
        assert!(limiter.allow("a@example.com"));
        assert!(limiter.allow("b@example.com"));
        assert!(!limiter.allow("a@example.com"));
    }
}
