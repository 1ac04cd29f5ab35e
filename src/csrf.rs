// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! One-time CSRF token issuance and verification.
//!
//! A token is an opaque random string whose presence in the store is
//! its validity. Successful validation consumes the store entry through
//! the atomic `delete_if_present` primitive, so a replayed or
//! double-submitted token loses the race and is rejected. This is
//! deliberately not idempotent.

use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::store::{csrf_key, SessionStore};

/// Random bytes per token; hex-encoded on issue.
const TOKEN_BYTES: usize = 32;

/// Issues and verifies single-use CSRF tokens.
pub struct CsrfTokens {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl CsrfTokens {
    pub fn new(store: Arc<dyn SessionStore>, ttl_secs: u64) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Mint a token and register it with the configured TTL.
    pub fn issue(&self) -> anyhow::Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.store.set(&csrf_key(&token), "1", Some(self.ttl))?;
        Ok(token)
    }

    /// Verify the double-submit pair and consume the token.
    ///
    /// Requires both values present, equal under constant-time
    /// comparison, and a live store entry. Success deletes the entry;
    /// every failure path deletes nothing. A store outage fails closed:
    /// CSRF is authentication-adjacent.
    pub fn validate(&self, cookie_token: Option<&str>, header_token: Option<&str>) -> bool {
        let (cookie, header) = match (cookie_token, header_token) {
            (Some(c), Some(h)) if !c.is_empty() && !h.is_empty() => (c, h),
            _ => return false,
        };
        if cookie.len() != header.len() {
            return false;
        }
        if cookie.as_bytes().ct_eq(header.as_bytes()).unwrap_u8() != 1 {
            return false;
        }
        match self.store.delete_if_present(&csrf_key(cookie)) {
            Ok(consumed) => consumed,
            Err(err) => {
                tracing::warn!(detail = %err, "csrf store unavailable; rejecting token");
                false
            }
        }
    }
}
