// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Risk score accumulation and decay.
//!
//! Within a single request the score only rises (signal deltas are
//! summed and clamped to 100). It trends downward only across periodic
//! re-checks with no suspicious activity, so one clean request cannot
//! erase a threat detected moments earlier.

use crate::session::SessionRecord;
use crate::types::ThreatSignal;

/// Upper bound of the risk score.
pub const MAX_RISK_SCORE: u8 = 100;

/// Fold a request's signals into the current score. Clamped to
/// `[0, 100]`; saturating arithmetic keeps intermediate sums in range.
pub fn apply(current: u8, signals: &[ThreatSignal]) -> u8 {
    let total: u32 = signals.iter().map(|s| u32::from(s.risk_delta)).sum();
    let raw = u32::from(current).saturating_add(total);
    raw.min(u32::from(MAX_RISK_SCORE)) as u8
}

/// Good-behavior decay, applied at most once per re-check interval.
///
/// Eligible only when the session has no recorded suspicious activity
/// and a positive score; never goes below zero.
pub fn decay(record: &SessionRecord, amount: u8) -> u8 {
    if record.suspicious_activity_count == 0 && record.risk_score > 0 {
        record.risk_score.saturating_sub(amount)
    } else {
        record.risk_score
    }
}
