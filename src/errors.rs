// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sanitized rejection responses.
//!
//! Every user-facing rejection carries an actionable message and a
//! unique reference code for support correlation; the full internal
//! detail goes to the log under that same reference. Responses never
//! expose scores, thresholds, rule names, or store internals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;

use crate::audit::redact_secrets;
use crate::types::{SecurityAction, ValidationFailure};

/// Generate a unique rejection reference code.
/// Format: ERR-YYYYMMDD-XXXXXX (e.g., ERR-20250114-A3F8K2)
pub fn generate_reference_code() -> String {
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".chars().collect();
    let random: String = (0..6)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect();
    format!("ERR-{}-{}", date, random)
}

/// User-facing rejection produced by the security layer.
///
/// These responses never expose risk scores, detection rule names,
/// store details, or other internals. The `code` field is the
/// machine-readable contract for clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SecurityRejection {
    /// Step-up authentication required (403).
    MfaRequired {
        message: String,
        reference: String,
        verify_url: String,
    },

    /// Session locked pending review (423).
    SecurityReview {
        message: String,
        reference: String,
        support_contact: String,
    },

    /// Session terminated; credentials must be discarded (401).
    SessionTerminated {
        message: String,
        reference: String,
        /// Clients must drop stored credentials before retrying.
        clear_credentials: bool,
    },

    /// CSRF token missing, mismatched, or already used (403).
    CsrfRejected {
        message: String,
        reference: String,
    },

    /// Operation rate limit or lockout (429).
    RateLimited {
        message: String,
        reference: String,
        retry_after_secs: u64,
    },
}

impl SecurityRejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SecurityRejection::MfaRequired { .. } => StatusCode::FORBIDDEN,
            SecurityRejection::SecurityReview { .. } => StatusCode::LOCKED,
            SecurityRejection::SessionTerminated { .. } => StatusCode::UNAUTHORIZED,
            SecurityRejection::CsrfRejected { .. } => StatusCode::FORBIDDEN,
            SecurityRejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            SecurityRejection::MfaRequired { reference, .. } => reference,
            SecurityRejection::SecurityReview { reference, .. } => reference,
            SecurityRejection::SessionTerminated { reference, .. } => reference,
            SecurityRejection::CsrfRejected { reference, .. } => reference,
            SecurityRejection::RateLimited { reference, .. } => reference,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SecurityRejection::MfaRequired { message, .. } => message,
            SecurityRejection::SecurityReview { message, .. } => message,
            SecurityRejection::SessionTerminated { message, .. } => message,
            SecurityRejection::CsrfRejected { message, .. } => message,
            SecurityRejection::RateLimited { message, .. } => message,
        }
    }

    /// Step-up verification demanded by the risk engine.
    pub fn mfa_required(principal_id: &str) -> Self {
        let reference = generate_reference_code();
        tracing::warn!(
            reference = %reference,
            principal = %redact_secrets(principal_id),
            "MFA re-verification required"
        );
        Self::MfaRequired {
            message: "Additional verification is required to continue.".to_string(),
            reference,
            verify_url: "/auth/mfa/verify".to_string(),
        }
    }

    /// Session frozen pending manual or step-up review.
    pub fn security_review(principal_id: &str) -> Self {
        let reference = generate_reference_code();
        tracing::warn!(
            reference = %reference,
            principal = %redact_secrets(principal_id),
            "Session locked for security review"
        );
        Self::SecurityReview {
            message: "Your account is temporarily locked pending a security review.".to_string(),
            reference,
            support_contact: "security@example.org".to_string(),
        }
    }

    /// Session is gone; the client must discard credentials and sign in
    /// again. The internal reason stays in the log.
    pub fn session_terminated(reason: Option<ValidationFailure>) -> Self {
        let reference = generate_reference_code();
        tracing::info!(
            reference = %reference,
            reason = reason.map(|r| r.as_str()).unwrap_or("forced"),
            "Session terminated"
        );
        Self::SessionTerminated {
            message: "Your session has ended. Please sign in again.".to_string(),
            reference,
            clear_credentials: true,
        }
    }

    pub fn csrf_rejected() -> Self {
        let reference = generate_reference_code();
        tracing::warn!(reference = %reference, "CSRF token rejected");
        Self::CsrfRejected {
            message: "Request could not be verified. Please refresh the page and try again."
                .to_string(),
            reference,
        }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let reference = generate_reference_code();
        tracing::warn!(
            reference = %reference,
            retry_after_secs = %retry_after_secs,
            "Rate limited"
        );
        Self::RateLimited {
            message: format!(
                "Too many attempts. Please wait {} seconds before trying again.",
                retry_after_secs
            ),
            reference,
            retry_after_secs,
        }
    }

    /// Map a resolved action to the rejection the client receives.
    /// `SecurityAction::None` has no rejection and returns `None`.
    pub fn from_action(action: SecurityAction, principal_id: &str) -> Option<Self> {
        match action {
            SecurityAction::None => None,
            SecurityAction::MfaRequired => Some(Self::mfa_required(principal_id)),
            SecurityAction::SecurityReview => Some(Self::security_review(principal_id)),
            SecurityAction::ForceLogout => Some(Self::session_terminated(None)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RejectionResponse {
    error: SecurityRejection,
    status: u16,
}

impl IntoResponse for SecurityRejection {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = match &self {
            SecurityRejection::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        };
        let body = serde_json::to_string(&RejectionResponse {
            status: status.as_u16(),
            error: self,
        })
        .unwrap_or_else(|_| {
            r#"{"error":{"code":"session_terminated","message":"Your session has ended. Please sign in again.","reference":"ERR-FALLBACK","clear_credentials":true},"status":401}"#.to_string()
        });

        match retry_after {
            Some(secs) => (
                status,
                [
                    ("content-type", "application/json".to_string()),
                    ("retry-after", secs.to_string()),
                ],
                body,
            )
                .into_response(),
            None => (status, [("content-type", "application/json")], body).into_response(),
        }
    }
}
