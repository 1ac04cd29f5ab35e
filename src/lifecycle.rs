// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session lifecycle orchestration.
//!
//! [`SessionLifecycle`] creates session records at login, runs the full
//! evaluation pipeline on every protected request (hard validity checks,
//! threat detection, risk scoring, action resolution), and periodically
//! purges dead records. `evaluate` is total: every path, including
//! store outages and malformed records, resolves to a [`Decision`]
//! rather than an error.
//!
//! Per session the state machine is
//! `CREATED -> ACTIVE <-> (signals raise score, decay lowers it)
//!  -> TERMINATED` (force logout, explicit invalidation, or sweep).
//! TERMINATED is absorbing; a new login mints a new session identifier.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::action;
use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::config::{EngineConfig, FailurePolicy};
use crate::risk;
use crate::session::{
    derive_session_id, validate_basic, Fingerprint, SessionOptions, SessionRecord,
};
use crate::store::{session_key, session_prefix, SessionStore, SESSION_SCAN_PREFIX};
use crate::threat::ThreatDetector;
use crate::types::{
    Decision, RequestContext, SecurityAction, Severity, ThreatKind, ThreatSignal,
    ValidationFailure,
};

/// Orchestrates session creation, per-request evaluation, invalidation,
/// and the cleanup sweep.
pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    detector: ThreatDetector,
    config: EngineConfig,
}

impl SessionLifecycle {
    /// Engine with the built-in detection rule chain.
    pub fn new(
        store: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        config: EngineConfig,
    ) -> Self {
        let detector = ThreatDetector::with_defaults(Arc::clone(&store));
        Self {
            store,
            audit,
            detector,
            config,
        }
    }

    /// Engine with a caller-composed rule chain.
    pub fn with_detector(
        store: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        config: EngineConfig,
        detector: ThreatDetector,
    ) -> Self {
        Self {
            store,
            audit,
            detector,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Allocate a session record at successful login.
    ///
    /// The record is persisted with the absolute-timeout TTL; the seed
    /// risk score reflects whether the login was MFA-verified.
    pub fn create(
        &self,
        principal_id: &str,
        session_token: &str,
        fingerprint: Fingerprint,
        options: SessionOptions,
    ) -> anyhow::Result<SessionRecord> {
        let session_id = derive_session_id(session_token);
        let record = SessionRecord::new(principal_id, &session_id, fingerprint, options, &self.config);
        self.persist(&record)?;
        self.audit.record(
            AuditEvent::new(AuditEventType::SessionCreated, principal_id, Severity::Low)
                .with_detail("session", &session_id)
                .with_detail("mfa_verified", options.mfa_verified.to_string())
                .with_detail("seed_risk", record.risk_score.to_string()),
        );
        Ok(record)
    }

    /// Evaluate one protected request end to end.
    pub fn evaluate(&self, principal_id: &str, request: &RequestContext) -> Decision {
        let now = Utc::now();
        let session_id = derive_session_id(&request.session_token);
        let key = session_key(principal_id, &session_id);

        let raw = match self.store.get(&key) {
            Ok(value) => value,
            Err(err) => return self.on_store_outage(principal_id, &err.to_string()),
        };

        let mut record = match raw.map(|data| SessionRecord::deserialize(&data)) {
            Some(Ok(record)) => record,
            Some(Err(err)) => {
                // Unreadable record: treat as absent, clear the key.
                tracing::warn!(session = %session_id, detail = %err, "malformed session record; discarding");
                let _ = self.store.delete(&key);
                return self.terminate_decision(principal_id, ValidationFailure::SessionNotFound);
            }
            None => {
                return self.terminate_decision(principal_id, ValidationFailure::SessionNotFound)
            }
        };

        if let Err(reason) = validate_basic(&record, now, &self.config) {
            // Dead session: no risk assessment. Expired records are
            // removed immediately instead of waiting for the sweep.
            if reason != ValidationFailure::SessionInvalidated {
                let _ = self.store.delete(&key);
            }
            return self.terminate_decision(principal_id, reason);
        }

        let mut signals = self.detector.detect(&record, request, &self.config);

        let check_due = record.risk_check_due(now, &self.config);
        let mut score = record.risk_score;
        if check_due {
            if let Some(signal) = self.concurrent_limit_signal(principal_id) {
                signals.push(signal);
            }
            // Decay is gated inside `risk::decay` on a record with no
            // recorded suspicious activity; signals raised by this very
            // request land on the decayed score afterwards.
            score = risk::decay(&record, self.config.good_behavior_decay);
            record.last_risk_check_at = now;
        }

        let previous_score = record.risk_score;
        score = risk::apply(score, &signals);
        record.risk_score = score;
        record.suspicious_activity_count += signals.len() as u32;
        record.last_activity_at = now;
        record.client_ip = request.client_ip.clone();
        record.user_agent = request.user_agent.clone();
        let is_api = self
            .config
            .api_path_prefixes
            .iter()
            .any(|prefix| request.path.starts_with(prefix.as_str()));
        if is_api {
            record.api_calls_count += 1;
        } else {
            record.page_views += 1;
        }

        let resolved = action::resolve(score, &signals, &self.config.thresholds);
        if resolved == SecurityAction::ForceLogout {
            record.valid = false;
        }

        if let Err(err) = self.persist(&record) {
            tracing::warn!(session = %session_id, detail = %err, "failed to persist evaluated session record");
        }

        self.audit_evaluation(principal_id, &session_id, previous_score, score, &signals, resolved);

        Decision {
            is_valid: resolved != SecurityAction::ForceLogout,
            risk_score: score,
            signals,
            action: resolved,
            reason: None,
        }
    }

    /// Revoke a session. Used on logout, password change, and forced
    /// logout. Revoking an absent session is a no-op.
    pub fn invalidate(&self, principal_id: &str, session_id: &str) -> anyhow::Result<()> {
        let key = session_key(principal_id, session_id);
        if let Some(data) = self.store.get(&key)? {
            let mut record = SessionRecord::deserialize(&data)?;
            record.valid = false;
            self.persist(&record)?;
            self.audit.record(
                AuditEvent::new(AuditEventType::SessionInvalidated, principal_id, Severity::Low)
                    .with_detail("session", session_id),
            );
        }
        Ok(())
    }

    /// Delete every session record past its absolute or inactivity
    /// timeout, or already revoked. Returns the number cleaned.
    ///
    /// Operates record by record with no global lock; safe to run
    /// concurrently with live evaluation and with other sweeps.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let keys = match self.store.scan_prefix(SESSION_SCAN_PREFIX) {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(detail = %err, "sweep aborted; store unavailable");
                return 0;
            }
        };

        let mut cleaned = 0;
        for key in keys {
            let data = match self.store.get(&key) {
                Ok(Some(data)) => data,
                // Deleted or expired since the scan; someone else won.
                Ok(None) => continue,
                Err(_) => continue,
            };
            let dead = match SessionRecord::deserialize(&data) {
                Ok(record) => validate_basic(&record, now, &self.config).is_err(),
                Err(_) => true,
            };
            if dead && self.store.delete(&key).is_ok() {
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            self.audit.record(
                AuditEvent::new(AuditEventType::SessionSwept, "system", Severity::Low)
                    .with_detail("cleaned", cleaned.to_string()),
            );
        }
        cleaned
    }

    fn persist(&self, record: &SessionRecord) -> anyhow::Result<()> {
        let remaining = ChronoDuration::seconds(self.config.absolute_timeout_secs as i64)
            - (Utc::now() - record.created_at);
        let ttl = Duration::from_secs(remaining.num_seconds().max(1) as u64);
        self.store.set(
            &session_key(&record.principal_id, &record.session_id),
            &record.serialize()?,
            Some(ttl),
        )?;
        Ok(())
    }

    /// Count the principal's stored sessions during the periodic
    /// re-check. Counts keys only; records revoked but not yet swept
    /// inflate the count slightly, which errs on the cautious side.
    fn concurrent_limit_signal(&self, principal_id: &str) -> Option<ThreatSignal> {
        let count = match self.store.scan_prefix(&session_prefix(principal_id)) {
            Ok(keys) => keys.len(),
            Err(err) => {
                tracing::warn!(detail = %err, "concurrent session count unavailable; skipping check");
                return None;
            }
        };
        if count <= self.config.max_concurrent_sessions {
            return None;
        }
        Some(ThreatSignal::new(
            ThreatKind::ConcurrentLimit,
            Severity::High,
            self.config.deltas.concurrent_limit,
            format!(
                "{count} live sessions, limit {}",
                self.config.max_concurrent_sessions
            ),
        ))
    }

    fn on_store_outage(&self, principal_id: &str, detail: &str) -> Decision {
        match self.config.store_failure_policy {
            FailurePolicy::FailClosed => {
                tracing::error!(principal = principal_id, detail, "session store unavailable; failing closed");
                self.terminate_decision(principal_id, ValidationFailure::SessionNotFound)
            }
            FailurePolicy::FailOpen => {
                // Documented trade-off: availability over assurance.
                // The session passes unevaluated with no score movement.
                tracing::error!(principal = principal_id, detail, "session store unavailable; failing open");
                Decision {
                    is_valid: true,
                    risk_score: 0,
                    signals: Vec::new(),
                    action: SecurityAction::None,
                    reason: None,
                }
            }
        }
    }

    fn terminate_decision(&self, principal_id: &str, reason: ValidationFailure) -> Decision {
        self.audit.record(
            AuditEvent::new(
                AuditEventType::SecurityActionRequired,
                principal_id,
                Severity::High,
            )
            .with_detail("action", SecurityAction::ForceLogout.as_str())
            .with_detail("reason", reason.as_str()),
        );
        Decision::terminated(reason)
    }

    fn audit_evaluation(
        &self,
        principal_id: &str,
        session_id: &str,
        previous_score: u8,
        score: u8,
        signals: &[ThreatSignal],
        resolved: SecurityAction,
    ) {
        let crossed_high =
            previous_score < self.config.thresholds.review && score >= self.config.thresholds.review;
        if crossed_high {
            let kinds = signals
                .iter()
                .map(|s| s.kind.as_str())
                .collect::<Vec<_>>()
                .join(",");
            self.audit.record(
                AuditEvent::new(AuditEventType::RiskEscalated, principal_id, Severity::High)
                    .with_detail("session", session_id)
                    .with_detail("score", score.to_string())
                    .with_detail("signals", kinds),
            );
        }
        if resolved != SecurityAction::None {
            let severity = if resolved == SecurityAction::ForceLogout {
                Severity::Critical
            } else {
                Severity::High
            };
            self.audit.record(
                AuditEvent::new(AuditEventType::SecurityActionRequired, principal_id, severity)
                    .with_detail("session", session_id)
                    .with_detail("action", resolved.as_str())
                    .with_detail("score", score.to_string()),
            );
        }
    }
}
