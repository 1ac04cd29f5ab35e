// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session record and basic lifetime validation.
//!
//! The validator here is intentionally cheap and independent of threat
//! detection: it runs first on every request and short-circuits the
//! whole risk pipeline for sessions that are already dead.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::types::ValidationFailure;

/// Hex length of derived session identifiers. 96 bits of the token
/// digest; short enough to stay readable in audit lines.
const SESSION_ID_HEX_LEN: usize = 24;

/// Derive the session identifier from the credential token.
///
/// The identifier is stable for the token's life and never stores the
/// token itself.
pub fn derive_session_id(session_token: &str) -> String {
    let digest = Sha256::digest(session_token.as_bytes());
    hex::encode(digest)[..SESSION_ID_HEX_LEN].to_string()
}

/// Last-observed client fingerprint components. A weak device proxy,
/// not cryptographic device binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub client_ip: String,
    pub user_agent: String,
}

/// Options fixed at session creation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionOptions {
    pub mfa_verified: bool,
    pub device_trusted: bool,
}

/// Stored state for one active login instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub principal_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub client_ip: String,
    pub user_agent: String,
    /// False once explicitly revoked. Never flips back to true.
    pub valid: bool,
    /// Accumulated suspicion, 0..=100.
    pub risk_score: u8,
    pub suspicious_activity_count: u32,
    /// Gates the periodic re-check.
    pub last_risk_check_at: DateTime<Utc>,
    pub mfa_verified: bool,
    pub device_trusted: bool,
    pub page_views: u64,
    pub api_calls_count: u64,
}

impl SessionRecord {
    /// Create a record for a fresh login. The seed risk score reflects
    /// how the principal authenticated.
    pub fn new(
        principal_id: impl Into<String>,
        session_id: impl Into<String>,
        fingerprint: Fingerprint,
        options: SessionOptions,
        config: &EngineConfig,
    ) -> Self {
        let now = Utc::now();
        let seed = if options.mfa_verified {
            config.seed_risk_mfa
        } else {
            config.seed_risk_password_only
        };
        Self {
            principal_id: principal_id.into(),
            session_id: session_id.into(),
            created_at: now,
            last_activity_at: now,
            client_ip: fingerprint.client_ip,
            user_agent: fingerprint.user_agent,
            valid: true,
            risk_score: seed.min(100),
            suspicious_activity_count: 0,
            last_risk_check_at: now,
            mfa_verified: options.mfa_verified,
            device_trusted: options.device_trusted,
            page_views: 0,
            api_calls_count: 0,
        }
    }

    /// Whether the periodic re-check is due.
    pub fn risk_check_due(&self, now: DateTime<Utc>, config: &EngineConfig) -> bool {
        now - self.last_risk_check_at > Duration::seconds(config.risk_check_interval_secs as i64)
    }

    pub fn serialize(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(data: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Hard lifetime checks. Runs before any risk assessment and
/// short-circuits to a force-logout outcome on failure.
pub fn validate_basic(
    record: &SessionRecord,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<(), ValidationFailure> {
    if !record.valid {
        return Err(ValidationFailure::SessionInvalidated);
    }
    if now - record.created_at > Duration::seconds(config.absolute_timeout_secs as i64) {
        return Err(ValidationFailure::SessionExpired);
    }
    if now - record.last_activity_at > Duration::seconds(config.inactivity_timeout_secs as i64) {
        return Err(ValidationFailure::InactiveSession);
    }
    Ok(())
}
