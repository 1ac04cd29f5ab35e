// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Security action resolution.
//!
//! A pure, deterministic mapping from `(risk score, threat signals)`
//! to the required corrective action. Evaluation order matters: the
//! first matching tier wins, so a critical signal terminates the
//! session regardless of score.

use crate::config::RiskThresholds;
use crate::types::{SecurityAction, Severity, ThreatKind, ThreatSignal};

/// Resolve the corrective action for one evaluated request.
///
/// Tiers, first match wins:
/// 1. any CRITICAL signal, or score at the force-logout threshold;
/// 2. score at the review threshold: security review when a device
///    change is among the signals (possible stolen credential on new
///    hardware), MFA re-verification otherwise;
/// 3. score at the elevated threshold: security review;
/// 4. otherwise no action.
pub fn resolve(
    risk_score: u8,
    signals: &[ThreatSignal],
    thresholds: &RiskThresholds,
) -> SecurityAction {
    let any_critical = signals.iter().any(|s| s.severity == Severity::Critical);
    if any_critical || risk_score >= thresholds.force_logout {
        return SecurityAction::ForceLogout;
    }
    if risk_score >= thresholds.review {
        let device_changed = signals.iter().any(|s| s.kind == ThreatKind::DeviceChange);
        return if device_changed {
            SecurityAction::SecurityReview
        } else {
            SecurityAction::MfaRequired
        };
    }
    if risk_score >= thresholds.elevated {
        return SecurityAction::SecurityReview;
    }
    SecurityAction::None
}
