// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Audit port for security-relevant decisions.
//!
//! The engine reports through a single [`AuditSink`] at well-defined
//! decision points: rate-limit lockouts, risk threshold crossings, and
//! any action other than NONE. Recording is fire-and-forget; a sink
//! must never block or fail the request path.
//!
//! Log format:
//! `2024-01-15 10:23:45 | RISK_ESCALATED | principal=u42 | HIGH | score=80`

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{LazyLock, Mutex};

use crate::types::Severity;

/// Redaction patterns for values that must never reach the audit log.
/// These are static, compile-time-validated regex patterns; a failure
/// to compile is a programmer error caught by the test suite.
static REDACTION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"Bearer [a-zA-Z0-9-._~+/]+=*").expect("bearer token regex is valid"),
            "Bearer [REDACTED]",
        ),
        (
            Regex::new(r"(?i)password[=:]\s*\S+").expect("password regex is valid"),
            "password=[REDACTED]",
        ),
        (
            Regex::new(r"\b[A-Fa-f0-9]{32,}\b").expect("token regex is valid"),
            "[REDACTED_TOKEN]",
        ),
    ]
});

/// Redact credential material from text before logging.
pub fn redact_secrets(text: &str) -> String {
    let mut result = text.to_string();
    for (pattern, replacement) in REDACTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }
    result
}

/// The decision points the engine reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    SessionCreated,
    SessionInvalidated,
    RateLimitLockout,
    RiskEscalated,
    SecurityActionRequired,
    SessionSwept,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionCreated => "SESSION_CREATED",
            Self::SessionInvalidated => "SESSION_INVALIDATED",
            Self::RateLimitLockout => "RATE_LIMIT_LOCKOUT",
            Self::RiskEscalated => "RISK_ESCALATED",
            Self::SecurityActionRequired => "SECURITY_ACTION_REQUIRED",
            Self::SessionSwept => "SESSION_SWEPT",
        }
    }
}

/// One security-relevant occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub principal_id: String,
    pub severity: Severity,
    /// Key-value metadata, redacted before any sink sees it.
    pub metadata: Vec<(String, String)>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, principal_id: impl Into<String>, severity: Severity) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            principal_id: principal_id.into(),
            severity,
            metadata: Vec::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .push((key.into(), redact_secrets(&value.into())));
        self
    }

    /// Format as a pipe-delimited log line.
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "{} | {} | principal={} | {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.event_type.as_str(),
            self.principal_id,
            self.severity.as_str(),
        );
        for (key, value) in &self.metadata {
            line.push_str(&format!(" | {key}={value}"));
        }
        line
    }
}

/// Outbound audit interface. Implementations must be non-blocking and
/// must swallow their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Sink that emits audit lines through `tracing`.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event.severity {
            Severity::Low => tracing::info!(target: "riskgate::audit", "{}", event.to_log_line()),
            Severity::Medium => tracing::warn!(target: "riskgate::audit", "{}", event.to_log_line()),
            Severity::High | Severity::Critical => {
                tracing::error!(target: "riskgate::audit", "{}", event.to_log_line())
            }
        }
    }
}

/// Sink that retains events in memory. Used by the test suite and by
/// hosts that batch-export audit trails themselves.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count_of(&self, event_type: AuditEventType) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
