// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sliding-window rate limiter with lockout.
//!
//! Counters live in the store as per-window buckets bumped with the
//! atomic `increment` primitive, so concurrent handlers never lose an
//! attempt. A separate lockout marker blocks requests without touching
//! the counter; probing during a lockout cannot extend it.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::config::{FailurePolicy, RateLimitRule};
use crate::store::{rate_counter_key, rate_lock_key, SessionStore};
use crate::types::Severity;

/// Result of one rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub blocked: bool,
    /// Remaining lockout in whole seconds, when blocked by a lockout.
    pub retry_after_secs: Option<u64>,
}

impl RateLimitOutcome {
    fn allowed() -> Self {
        Self {
            blocked: false,
            retry_after_secs: None,
        }
    }

    fn blocked_for(secs: u64) -> Self {
        Self {
            blocked: true,
            retry_after_secs: Some(secs),
        }
    }
}

/// Per-operation request limiter.
pub struct RateLimiter {
    store: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SessionStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Count one attempt for `(identifier, operation)` against `rule`.
    ///
    /// The first call in a window creates the counter at 1; exceeding
    /// `max_attempts` starts a lockout of `lockout_ms`. While locked,
    /// calls are rejected without incrementing anything.
    pub fn check_and_consume(
        &self,
        identifier: &str,
        operation: &str,
        rule: &RateLimitRule,
    ) -> RateLimitOutcome {
        let lock_key = rate_lock_key(identifier, operation);

        match self.store.get(&lock_key) {
            Ok(Some(unlock_at_ms)) => {
                return RateLimitOutcome::blocked_for(remaining_secs(&unlock_at_ms, rule));
            }
            Ok(None) => {}
            Err(err) => return self.on_store_failure(operation, rule, &err.to_string()),
        }

        let now_ms = Utc::now().timestamp_millis() as u64;
        // A zero-width window is a configuration error; treat it as one
        // millisecond instead of dividing by zero.
        let window_ms = rule.window_ms.max(1);
        let window_start = now_ms / window_ms * window_ms;
        let counter_key = rate_counter_key(identifier, operation, window_start);

        let attempts = match self
            .store
            .increment(&counter_key, Duration::from_millis(window_ms))
        {
            Ok(n) => n,
            Err(err) => return self.on_store_failure(operation, rule, &err.to_string()),
        };

        if attempts <= i64::from(rule.max_attempts) {
            return RateLimitOutcome::allowed();
        }

        let unlock_at_ms = now_ms + rule.lockout_ms;
        if let Err(err) = self.store.set(
            &lock_key,
            &unlock_at_ms.to_string(),
            Some(Duration::from_millis(rule.lockout_ms)),
        ) {
            return self.on_store_failure(operation, rule, &err.to_string());
        }

        // Only the transition into lockout is audit-worthy; later
        // blocked calls short-circuit on the lock marker above.
        if attempts == i64::from(rule.max_attempts) + 1 {
            self.audit.record(
                AuditEvent::new(AuditEventType::RateLimitLockout, identifier, Severity::Medium)
                    .with_detail("operation", operation)
                    .with_detail("attempts", attempts.to_string())
                    .with_detail("lockout_secs", (rule.lockout_ms / 1000).to_string()),
            );
        }

        RateLimitOutcome::blocked_for(rule.lockout_ms / 1000)
    }

    fn on_store_failure(
        &self,
        operation: &str,
        rule: &RateLimitRule,
        detail: &str,
    ) -> RateLimitOutcome {
        tracing::warn!(
            operation,
            policy = ?rule.failure_policy,
            detail,
            "rate limit store unavailable; applying failure policy"
        );
        match rule.failure_policy {
            FailurePolicy::FailOpen => RateLimitOutcome::allowed(),
            FailurePolicy::FailClosed => RateLimitOutcome {
                blocked: true,
                retry_after_secs: None,
            },
        }
    }
}

fn remaining_secs(unlock_at_ms: &str, rule: &RateLimitRule) -> u64 {
    let now_ms = Utc::now().timestamp_millis() as u64;
    match unlock_at_ms.parse::<u64>() {
        // Round up so callers never retry a second early.
        Ok(unlock) if unlock > now_ms => (unlock - now_ms).div_ceil(1000),
        Ok(_) => 0,
        Err(_) => rule.lockout_ms / 1000,
    }
}
