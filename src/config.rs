// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Engine configuration.
//!
//! Every tunable the engine consults is externally supplied through
//! [`EngineConfig`]: session timeouts, risk thresholds, per-signal risk
//! deltas, rate-limit rules, and the store failure policy. All structs
//! derive serde so hosts can load them from TOML or JSON; `Default`
//! carries the documented production values.

use serde::{Deserialize, Serialize};

/// Default absolute session lifetime: 8 hours.
pub const DEFAULT_ABSOLUTE_TIMEOUT_SECS: u64 = 8 * 3600;

/// Default inactivity timeout: 30 minutes.
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 30 * 60;

/// Default interval between periodic risk re-checks: 5 minutes.
pub const DEFAULT_RISK_CHECK_INTERVAL_SECS: u64 = 5 * 60;

/// Default CSRF token lifetime: 1 hour.
pub const DEFAULT_CSRF_TTL_SECS: u64 = 3600;

/// What to do when the backing store is unreachable.
///
/// Fail-closed rejects the request outright; fail-open lets it through.
/// Authentication-adjacent checks default to fail-closed, low-stakes
/// counters to fail-open, so an outage degrades rate limiting before it
/// locks everyone out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FailOpen,
    FailClosed,
}

/// Risk score boundaries consumed by the action resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// At or above this score the session is forcibly terminated.
    pub force_logout: u8,
    /// At or above this score re-verification or review is required.
    pub review: u8,
    /// At or above this score the session is flagged for review.
    pub elevated: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            force_logout: 100,
            review: 75,
            elevated: 50,
        }
    }
}

/// Risk score increments per threat category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDeltas {
    pub ip_change: u8,
    pub device_change: u8,
    pub rapid_requests: u8,
    /// Administrative path accessed from an untrusted device.
    pub untrusted_admin_access: u8,
    /// Destructive method issued by a session with a high API-call count.
    pub destructive_burst: u8,
    pub concurrent_limit: u8,
}

impl Default for RiskDeltas {
    fn default() -> Self {
        Self {
            ip_change: 15,
            device_change: 30,
            rapid_requests: 10,
            untrusted_admin_access: 25,
            destructive_burst: 15,
            concurrent_limit: 20,
        }
    }
}

/// Sliding-window rate limit for one protected operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Counting window in milliseconds.
    pub window_ms: u64,
    /// Attempts allowed within one window.
    pub max_attempts: u32,
    /// Lockout duration once the window is exceeded, in milliseconds.
    pub lockout_ms: u64,
    /// Store-outage behavior for this operation.
    pub failure_policy: FailurePolicy,
}

impl RateLimitRule {
    /// Rule for login-style endpoints: 5 attempts per minute, then a
    /// 15-minute lockout. Fails closed during store outages.
    pub fn auth_default() -> Self {
        Self {
            window_ms: 60_000,
            max_attempts: 5,
            lockout_ms: 900_000,
            failure_policy: FailurePolicy::FailClosed,
        }
    }

    /// Rule for ordinary API traffic: 120 requests per minute with a
    /// 1-minute lockout. Fails open during store outages.
    pub fn api_default() -> Self {
        Self {
            window_ms: 60_000,
            max_attempts: 120,
            lockout_ms: 60_000,
            failure_policy: FailurePolicy::FailOpen,
        }
    }
}

/// Per-operation rate-limit rules consumed by the middleware guard.
///
/// Requests whose path matches one of `auth_path_prefixes` are counted
/// under the strict `auth` rule; everything else under `api`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRules {
    /// Path prefixes routed to the `auth` rule.
    pub auth_path_prefixes: Vec<String>,
    pub auth: RateLimitRule,
    pub api: RateLimitRule,
}

impl Default for RateLimitRules {
    fn default() -> Self {
        Self {
            auth_path_prefixes: vec!["/auth".to_string()],
            auth: RateLimitRule::auth_default(),
            api: RateLimitRule::api_default(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum session lifetime regardless of activity, in seconds.
    pub absolute_timeout_secs: u64,
    /// Maximum idle time before a session is considered dead, in seconds.
    pub inactivity_timeout_secs: u64,
    /// Live sessions allowed per principal before the concurrent-limit
    /// signal fires.
    pub max_concurrent_sessions: usize,
    /// Seconds between periodic risk re-checks for a session.
    pub risk_check_interval_secs: u64,
    /// CSRF token lifetime in seconds.
    pub csrf_ttl_secs: u64,
    /// Initial risk score for sessions created after MFA verification.
    pub seed_risk_mfa: u8,
    /// Initial risk score for password-only sessions.
    pub seed_risk_password_only: u8,
    /// Amount subtracted from the score per clean re-check interval.
    pub good_behavior_decay: u8,
    /// Requests per minute above which the rapid-request signal fires.
    pub rapid_requests_per_minute: u32,
    /// API-call count above which destructive methods are treated as
    /// suspicious.
    pub api_call_burst_threshold: u64,
    /// Path prefixes considered administrative.
    pub admin_path_prefixes: Vec<String>,
    /// Path prefixes counted as API calls rather than page views.
    pub api_path_prefixes: Vec<String>,
    /// HTTP methods considered destructive.
    pub destructive_methods: Vec<String>,
    /// Store-outage behavior for session evaluation itself.
    pub store_failure_policy: FailurePolicy,
    pub thresholds: RiskThresholds,
    pub deltas: RiskDeltas,
    pub rate_limits: RateLimitRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            absolute_timeout_secs: DEFAULT_ABSOLUTE_TIMEOUT_SECS,
            inactivity_timeout_secs: DEFAULT_INACTIVITY_TIMEOUT_SECS,
            max_concurrent_sessions: 5,
            risk_check_interval_secs: DEFAULT_RISK_CHECK_INTERVAL_SECS,
            csrf_ttl_secs: DEFAULT_CSRF_TTL_SECS,
            seed_risk_mfa: 10,
            seed_risk_password_only: 25,
            good_behavior_decay: 5,
            rapid_requests_per_minute: 120,
            api_call_burst_threshold: 100,
            admin_path_prefixes: vec!["/admin".to_string(), "/api/admin".to_string()],
            api_path_prefixes: vec!["/api".to_string()],
            destructive_methods: vec!["DELETE".to_string()],
            store_failure_policy: FailurePolicy::FailClosed,
            thresholds: RiskThresholds::default(),
            deltas: RiskDeltas::default(),
            rate_limits: RateLimitRules::default(),
        }
    }
}

impl EngineConfig {
    /// Validate cross-field consistency, warning on suspect values
    /// rather than rejecting them.
    pub fn validated(self) -> Self {
        if self.inactivity_timeout_secs > self.absolute_timeout_secs {
            tracing::warn!(
                inactivity = self.inactivity_timeout_secs,
                absolute = self.absolute_timeout_secs,
                "inactivity timeout exceeds absolute timeout; inactivity check will never fire first"
            );
        }
        if self.thresholds.elevated >= self.thresholds.review
            || self.thresholds.review >= self.thresholds.force_logout
        {
            tracing::warn!(
                elevated = self.thresholds.elevated,
                review = self.thresholds.review,
                force_logout = self.thresholds.force_logout,
                "risk thresholds are not strictly increasing"
            );
        }
        for (operation, rule) in [("auth", &self.rate_limits.auth), ("api", &self.rate_limits.api)] {
            if rule.window_ms == 0 {
                tracing::warn!(operation, "rate limit window is zero; limiter will treat it as 1ms");
            }
        }
        self
    }
}
