// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! TTL key-value store abstraction.
//!
//! The store is the only shared mutable state in the engine. Everything
//! else holds short-lived call parameters, so the engine runs safely
//! across concurrent request handlers as long as the store provides
//! per-key atomicity for [`SessionStore::increment`] and
//! [`SessionStore::delete_if_present`].
//!
//! [`memory::MemoryStore`] is the single-process implementation; a
//! distributed cache adapter plugs in behind the same trait.

pub mod locks;
pub mod memory;

use std::fmt;
use std::time::Duration;

/// Store operation failure. The engine treats every variant as
/// "store unavailable" and applies the configured failure policy.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(detail) => write!(f, "store unavailable: {detail}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

/// Contract the engine needs from a TTL-capable key-value store.
///
/// Operations are synchronous single round trips; adapters for remote
/// stores may block internally. `increment` and `delete_if_present`
/// must be atomic per key.
pub trait SessionStore: Send + Sync {
    /// Fetch a value, or `None` when absent or expired.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store a value, replacing any existing entry. `ttl = None` means
    /// no expiry.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Atomically remove a key, reporting whether it was present and
    /// live. This is the primitive behind CSRF single-use semantics.
    fn delete_if_present(&self, key: &str) -> StoreResult<bool>;

    /// Atomically increment a counter, creating it at 1 with the given
    /// TTL when absent. Returns the post-increment value.
    fn increment(&self, key: &str, ttl: Duration) -> StoreResult<i64>;

    /// List live keys under a prefix. Used for concurrent-session
    /// counting and the cleanup sweep.
    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Key for a session record.
pub fn session_key(principal_id: &str, session_id: &str) -> String {
    format!("session:{principal_id}:{session_id}")
}

/// Prefix covering all of a principal's session records.
pub fn session_prefix(principal_id: &str) -> String {
    format!("session:{principal_id}:")
}

/// Prefix covering every session record.
pub const SESSION_SCAN_PREFIX: &str = "session:";

/// Key for a rate-limit counter bucket.
pub fn rate_counter_key(identifier: &str, operation: &str, window_start_ms: u64) -> String {
    format!("rate:{identifier}:{operation}:{window_start_ms}")
}

/// Key for a rate-limit lockout marker.
pub fn rate_lock_key(identifier: &str, operation: &str) -> String {
    format!("ratelock:{identifier}:{operation}")
}

/// Key for a CSRF token.
pub fn csrf_key(token: &str) -> String {
    format!("csrf:{token}")
}

/// Key for a principal's short-window request counter.
pub fn request_window_key(principal_id: &str, minute_bucket: i64) -> String {
    format!("reqwin:{principal_id}:{minute_bucket}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_layout() {
        assert_eq!(session_key("alice", "abc123"), "session:alice:abc123");
        assert!(session_key("alice", "abc123").starts_with(&session_prefix("alice")));
        assert!(session_prefix("alice").starts_with(SESSION_SCAN_PREFIX));
    }

    #[test]
    fn test_rate_keys_distinct_per_operation() {
        let a = rate_counter_key("1.2.3.4", "login", 60_000);
        let b = rate_counter_key("1.2.3.4", "reset_password", 60_000);
        assert_ne!(a, b);
        assert_ne!(rate_lock_key("1.2.3.4", "login"), rate_lock_key("1.2.3.4", "reset_password"));
    }
}
