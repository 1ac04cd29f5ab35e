// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Threat detection rule chain.
//!
//! Detection is an ordered list of independent rules. Each rule sees
//! the stored session record and the incoming request and produces at
//! most one signal; any subset may fire on one request and all deltas
//! are summed downstream by the risk scorer. New rules append to the
//! chain without touching existing ones.
//!
//! The concurrent-session check is intentionally absent here: it runs
//! only during the periodic re-check in the lifecycle manager to bound
//! per-request cost.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::session::SessionRecord;
use crate::store::{request_window_key, SessionStore};
use crate::types::{RequestContext, Severity, ThreatKind, ThreatSignal};

/// One detection rule. Implementations must be side-effect free apart
/// from their own store counters.
pub trait ThreatRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(
        &self,
        record: &SessionRecord,
        request: &RequestContext,
        config: &EngineConfig,
    ) -> Option<ThreatSignal>;
}

/// Fires when the observed client IP differs from the stored one.
///
/// The "network changed" flag compares first octets as a coarse
/// stand-in for a geolocation lookup; it is a placeholder signal, not
/// authoritative geolocation.
pub struct IpChangeRule;

impl ThreatRule for IpChangeRule {
    fn name(&self) -> &'static str {
        "ip_change"
    }

    fn evaluate(
        &self,
        record: &SessionRecord,
        request: &RequestContext,
        config: &EngineConfig,
    ) -> Option<ThreatSignal> {
        if record.client_ip == request.client_ip {
            return None;
        }
        let network_changed = first_octet(&record.client_ip) != first_octet(&request.client_ip);
        Some(ThreatSignal::new(
            ThreatKind::IpChange,
            Severity::Medium,
            config.deltas.ip_change,
            format!(
                "old={} new={} network_changed={}",
                record.client_ip, request.client_ip, network_changed
            ),
        ))
    }
}

fn first_octet(ip: &str) -> &str {
    ip.split(['.', ':']).next().unwrap_or(ip)
}

/// Fires when the User-Agent differs from the stored one. The UA is a
/// weak device proxy; no cryptographic device binding is assumed.
pub struct DeviceChangeRule;

impl ThreatRule for DeviceChangeRule {
    fn name(&self) -> &'static str {
        "device_change"
    }

    fn evaluate(
        &self,
        record: &SessionRecord,
        request: &RequestContext,
        config: &EngineConfig,
    ) -> Option<ThreatSignal> {
        if record.user_agent == request.user_agent {
            return None;
        }
        Some(ThreatSignal::new(
            ThreatKind::DeviceChange,
            Severity::High,
            config.deltas.device_change,
            "user agent differs from stored fingerprint".to_string(),
        ))
    }
}

/// Fires when a principal's short-window request counter exceeds the
/// per-minute threshold. The counter lives in the store under a
/// one-minute bucket; a store outage skips the rule rather than
/// blocking traffic (low-stakes counter).
pub struct RapidRequestRule {
    store: Arc<dyn SessionStore>,
}

impl RapidRequestRule {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

impl ThreatRule for RapidRequestRule {
    fn name(&self) -> &'static str {
        "rapid_requests"
    }

    fn evaluate(
        &self,
        record: &SessionRecord,
        _request: &RequestContext,
        config: &EngineConfig,
    ) -> Option<ThreatSignal> {
        let bucket = Utc::now().timestamp() / 60;
        let key = request_window_key(&record.principal_id, bucket);
        let count = match self.store.increment(&key, Duration::from_secs(60)) {
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(detail = %err, "request window counter unavailable; skipping rule");
                return None;
            }
        };
        if count <= i64::from(config.rapid_requests_per_minute) {
            return None;
        }
        Some(ThreatSignal::new(
            ThreatKind::RapidRequests,
            Severity::Medium,
            config.deltas.rapid_requests,
            format!("{count} requests in current minute"),
        ))
    }
}

/// Fires on administrative paths reached from a session whose device
/// was never marked trusted.
pub struct UntrustedAdminAccessRule;

impl ThreatRule for UntrustedAdminAccessRule {
    fn name(&self) -> &'static str {
        "untrusted_admin_access"
    }

    fn evaluate(
        &self,
        record: &SessionRecord,
        request: &RequestContext,
        config: &EngineConfig,
    ) -> Option<ThreatSignal> {
        if record.device_trusted {
            return None;
        }
        let is_admin = config
            .admin_path_prefixes
            .iter()
            .any(|prefix| request.path.starts_with(prefix.as_str()));
        if !is_admin {
            return None;
        }
        Some(ThreatSignal::new(
            ThreatKind::SuspiciousActivity,
            Severity::High,
            config.deltas.untrusted_admin_access,
            format!("admin path {} from untrusted device", request.path),
        ))
    }
}

/// Fires on destructive methods issued by a session whose API-call
/// counter already exceeds the burst threshold.
pub struct DestructiveBurstRule;

impl ThreatRule for DestructiveBurstRule {
    fn name(&self) -> &'static str {
        "destructive_burst"
    }

    fn evaluate(
        &self,
        record: &SessionRecord,
        request: &RequestContext,
        config: &EngineConfig,
    ) -> Option<ThreatSignal> {
        if record.api_calls_count <= config.api_call_burst_threshold {
            return None;
        }
        let destructive = config
            .destructive_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&request.method));
        if !destructive {
            return None;
        }
        Some(ThreatSignal::new(
            ThreatKind::SuspiciousActivity,
            Severity::Medium,
            config.deltas.destructive_burst,
            format!(
                "{} {} after {} api calls",
                request.method, request.path, record.api_calls_count
            ),
        ))
    }
}

/// Ordered rule chain.
pub struct ThreatDetector {
    rules: Vec<Box<dyn ThreatRule>>,
}

impl ThreatDetector {
    /// Chain with the built-in rules in their documented order.
    pub fn with_defaults(store: Arc<dyn SessionStore>) -> Self {
        Self {
            rules: vec![
                Box::new(IpChangeRule),
                Box::new(DeviceChangeRule),
                Box::new(RapidRequestRule::new(store)),
                Box::new(UntrustedAdminAccessRule),
                Box::new(DestructiveBurstRule),
            ],
        }
    }

    /// Empty chain, for hosts composing their own rule set.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule. Existing rules are never reordered.
    pub fn push_rule(&mut self, rule: Box<dyn ThreatRule>) {
        self.rules.push(rule);
    }

    /// Run every rule against the request. Signals are returned in
    /// chain order.
    pub fn detect(
        &self,
        record: &SessionRecord,
        request: &RequestContext,
        config: &EngineConfig,
    ) -> Vec<ThreatSignal> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let signal = rule.evaluate(record, request, config);
                if let Some(ref s) = signal {
                    tracing::debug!(rule = rule.name(), kind = %s.kind, delta = s.risk_delta, "threat rule fired");
                }
                signal
            })
            .collect()
    }
}
