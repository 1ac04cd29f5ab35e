// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared types for the session security engine.
//!
//! Everything that crosses a module boundary lives here: the request
//! context handed in by the HTTP layer, the threat signals emitted by
//! detection rules, and the decision returned to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request metadata supplied by the request-handling layer for each
/// protected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Client IP as observed by the edge (already proxy-resolved).
    pub client_ip: String,
    /// Raw User-Agent header value.
    pub user_agent: String,
    /// Request path, e.g. `/api/classes/42`.
    pub path: String,
    /// HTTP method, uppercase.
    pub method: String,
    /// Opaque credential token the session identifier is derived from.
    pub session_token: String,
}

/// Severity attached to a threat signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The closed set of threat categories a detection rule may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatKind {
    IpChange,
    DeviceChange,
    RapidRequests,
    SuspiciousActivity,
    ConcurrentLimit,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpChange => "IP_CHANGE",
            Self::DeviceChange => "DEVICE_CHANGE",
            Self::RapidRequests => "RAPID_REQUESTS",
            Self::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            Self::ConcurrentLimit => "CONCURRENT_LIMIT",
        }
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One finding from one detection rule. Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatSignal {
    pub kind: ThreatKind,
    pub severity: Severity,
    /// Amount added to the session risk score when this signal fires.
    pub risk_delta: u8,
    /// Free-form detail carried through to the audit sink.
    pub detail: String,
}

impl ThreatSignal {
    pub fn new(
        kind: ThreatKind,
        severity: Severity,
        risk_delta: u8,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            risk_delta,
            detail: detail.into(),
        }
    }
}

/// Corrective action required after evaluating a request.
///
/// The resolver is exhaustive over this enum; the HTTP layer maps each
/// variant to a response (proceed, 403, 423, 401).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityAction {
    None,
    MfaRequired,
    SecurityReview,
    ForceLogout,
}

impl SecurityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::MfaRequired => "MFA_REQUIRED",
            Self::SecurityReview => "SECURITY_REVIEW",
            Self::ForceLogout => "FORCE_LOGOUT",
        }
    }
}

impl fmt::Display for SecurityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a session failed the hard validity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationFailure {
    /// Absolute lifetime exceeded.
    SessionExpired,
    /// Inactivity timeout exceeded.
    InactiveSession,
    /// Record explicitly revoked.
    SessionInvalidated,
    /// No record for the presented token, or the record is unreadable.
    SessionNotFound,
}

impl ValidationFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::InactiveSession => "INACTIVE_SESSION",
            Self::SessionInvalidated => "SESSION_INVALIDATED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of evaluating one protected request.
///
/// Every evaluation produces a `Decision`; error paths resolve to a
/// force-logout decision rather than propagating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub is_valid: bool,
    pub risk_score: u8,
    pub signals: Vec<ThreatSignal>,
    pub action: SecurityAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ValidationFailure>,
}

impl Decision {
    /// A terminal decision: session unusable, caller must force logout.
    pub fn terminated(reason: ValidationFailure) -> Self {
        Self {
            is_valid: false,
            risk_score: 0,
            signals: Vec::new(),
            action: SecurityAction::ForceLogout,
            reason: Some(reason),
        }
    }
}
