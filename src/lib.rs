// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! riskgate - Risk-based session security engine
//!
//! Continuous session evaluation instead of login-time-only checks.
//!
//! Every protected request flows through one pipeline: hard validity
//! checks, threat detection, risk scoring, and action resolution.
//! Suspicion accumulates on a 0..=100 score per session; crossing a
//! threshold demands MFA re-verification, locks the session for review,
//! or terminates it outright.
//!
//! **validate** -> **detect** -> **score** -> **resolve**
//!
//! # Core Modules
//!
//! - [`lifecycle`] - Session creation, per-request evaluation, and sweep
//! - [`threat`] - Detection rule chain (IP/device change, bursts, admin access)
//! - [`risk`] - Score accumulation and good-behavior decay
//! - [`action`] - Pure resolver from score and signals to corrective action
//! - [`session`] - Session records and hard lifetime validation
//! - [`ratelimit`] - Windowed rate limiting with lockout
//! - [`csrf`] - Single-use double-submit CSRF tokens
//! - [`store`] - TTL key-value store abstraction and in-memory backend
//! - [`audit`] - Redacting audit sink for security decisions
//! - [`middleware`] - Axum guards wiring the engine into a router
//! - [`errors`] - Sanitized HTTP rejections with reference codes
//! - [`config`] - Engine tunables

pub mod action;
pub mod audit;
pub mod config;
pub mod csrf;
pub mod errors;
pub mod lifecycle;
pub mod middleware;
pub mod ratelimit;
pub mod risk;
pub mod session;
pub mod store;
pub mod threat;
pub mod types;

// Re-export the shared vocabulary types
pub use types::{
    Decision, RequestContext, SecurityAction, Severity, ThreatKind, ThreatSignal,
    ValidationFailure,
};

// Re-export configuration
pub use config::{
    EngineConfig, FailurePolicy, RateLimitRule, RateLimitRules, RiskDeltas, RiskThresholds,
    DEFAULT_ABSOLUTE_TIMEOUT_SECS, DEFAULT_CSRF_TTL_SECS, DEFAULT_INACTIVITY_TIMEOUT_SECS,
    DEFAULT_RISK_CHECK_INTERVAL_SECS,
};

// Re-export the engine surface
pub use lifecycle::SessionLifecycle;
pub use session::{derive_session_id, validate_basic, Fingerprint, SessionOptions, SessionRecord};
pub use threat::{ThreatDetector, ThreatRule};
pub use risk::{apply as apply_risk, decay as decay_risk, MAX_RISK_SCORE};
pub use action::resolve as resolve_action;

// Re-export store types
pub use store::{memory::MemoryStore, SessionStore, StoreError, StoreResult};

// Re-export auxiliary protections
pub use csrf::CsrfTokens;
pub use ratelimit::{RateLimitOutcome, RateLimiter};

// Re-export audit types
pub use audit::{
    redact_secrets, AuditEvent, AuditEventType, AuditSink, MemoryAuditSink, TracingAuditSink,
};

// Re-export the HTTP surface
pub use errors::{generate_reference_code, SecurityRejection};
pub use middleware::{
    csrf_guard, rate_limit_guard, session_guard, AuthenticatedPrincipal, SecurityState,
};
