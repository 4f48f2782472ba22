// crates/tenant-gate-http/src/rate_limit.rs
// ============================================================================
// Module: Client Rate Limiter
// Description: Fixed-window request budget keyed by client partition key.
// Purpose: Throttle abusive clients before tenancy work runs.
// Dependencies: tenant-gate-config, tokio, tracing
// ============================================================================

//! ## Overview
//! [`RateLimiter`] tracks one fixed window per client key. Keys come from the
//! trust-boundary client identifier, so a client behind a trusted proxy is
//! counted by its forwarded address and everyone else by peer address.
//!
//! Security posture: the table is bounded. When it is full and no window has
//! expired, unknown keys are refused rather than admitted untracked.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use tenant_gate_config::RateLimitConfig;
use tokio::time::Instant;
use tracing::warn;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request admitted.
    Allowed {
        /// Requests left in the current window.
        remaining: u32,
    },
    /// Request refused.
    Limited {
        /// Time until the client may retry.
        retry_after: Duration,
    },
}

/// Per-key window state.
#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    /// Window start.
    started: Instant,
    /// Requests admitted in the window.
    count: u32,
}

/// Fixed-window rate limiter.
///
/// # Invariants
/// - At most `max_entries` keys are tracked.
/// - A key never exceeds `max_requests` admissions per window.
#[derive(Debug)]
pub struct RateLimiter {
    /// Admissions per window.
    max_requests: u32,
    /// Window length.
    window: Duration,
    /// Tracked key bound.
    max_entries: usize,
    /// Window state per key.
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl RateLimiter {
    /// Builds a limiter from validated configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_millis(config.window_ms),
            max_entries: config.max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Checks and records one request for `key`.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Checks and records one request for `key` at `now`.
    fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(key) {
            let mut elapsed = now.saturating_duration_since(entry.started);
            if elapsed >= self.window {
                entry.started = now;
                entry.count = 0;
                elapsed = Duration::ZERO;
            }
            if entry.count >= self.max_requests {
                return RateLimitDecision::Limited {
                    retry_after: self.window.saturating_sub(elapsed),
                };
            }
            entry.count += 1;
            return RateLimitDecision::Allowed {
                remaining: self.max_requests - entry.count,
            };
        }

        if entries.len() >= self.max_entries {
            let window = self.window;
            entries.retain(|_, entry| now.saturating_duration_since(entry.started) < window);
        }
        if entries.len() >= self.max_entries {
            let retry_after = entries
                .values()
                .map(|entry| self.window.saturating_sub(now.saturating_duration_since(entry.started)))
                .min()
                .unwrap_or(self.window);
            drop(entries);
            warn!(max_entries = self.max_entries, "rate limit table full; refusing new client");
            return RateLimitDecision::Limited {
                retry_after,
            };
        }
        entries.insert(
            key.to_string(),
            WindowEntry {
                started: now,
                count: 1,
            },
        );
        RateLimitDecision::Allowed {
            remaining: self.max_requests.saturating_sub(1),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::missing_docs_in_private_items,
        reason = "Test-only helpers are self-describing."
    )]

    use std::time::Duration;

    use tenant_gate_config::RateLimitConfig;
    use tokio::time::Instant;

    use super::RateLimitDecision;
    use super::RateLimiter;

    fn limiter(max_requests: u32, window_ms: u64, max_entries: usize) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window_ms,
            max_entries,
        })
    }

    #[test]
    fn admits_up_to_budget_then_limits() {
        let limiter = limiter(2, 1_000, 16);
        let now = Instant::now();
        assert_eq!(
            limiter.check_at("a", now),
            RateLimitDecision::Allowed {
                remaining: 1
            }
        );
        assert_eq!(
            limiter.check_at("a", now),
            RateLimitDecision::Allowed {
                remaining: 0
            }
        );
        let later = now + Duration::from_millis(400);
        assert_eq!(
            limiter.check_at("a", later),
            RateLimitDecision::Limited {
                retry_after: Duration::from_millis(600)
            }
        );
    }

    #[test]
    fn keys_are_counted_independently() {
        let limiter = limiter(1, 1_000, 16);
        let now = Instant::now();
        assert!(matches!(limiter.check_at("a", now), RateLimitDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at("b", now), RateLimitDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at("a", now), RateLimitDecision::Limited { .. }));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = limiter(1, 1_000, 16);
        let now = Instant::now();
        assert!(matches!(limiter.check_at("a", now), RateLimitDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at("a", now), RateLimitDecision::Limited { .. }));
        let next_window = now + Duration::from_millis(1_000);
        assert!(matches!(limiter.check_at("a", next_window), RateLimitDecision::Allowed { .. }));
    }

    #[test]
    fn full_table_refuses_unknown_keys_until_windows_expire() {
        let limiter = limiter(10, 1_000, 2);
        let now = Instant::now();
        assert!(matches!(limiter.check_at("a", now), RateLimitDecision::Allowed { .. }));
        let soon = now + Duration::from_millis(250);
        assert!(matches!(limiter.check_at("b", soon), RateLimitDecision::Allowed { .. }));
        assert_eq!(
            limiter.check_at("c", soon),
            RateLimitDecision::Limited {
                retry_after: Duration::from_millis(750)
            }
        );
        // Known keys keep working while the table is full.
        assert!(matches!(limiter.check_at("a", soon), RateLimitDecision::Allowed { .. }));

        let expired = now + Duration::from_millis(1_000);
        assert!(matches!(limiter.check_at("c", expired), RateLimitDecision::Allowed { .. }));
        assert_eq!(limiter.tracked_keys(), 2);
    }
}
