// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Single-process store implementation.
//!
//! A `HashMap` behind an `RwLock`, with per-entry expiry checked lazily
//! on read. Suitable for one-process deployments and tests; multi-node
//! deployments should adapt a shared cache behind [`SessionStore`]
//! instead.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::locks::{resilient_read, resilient_write};
use super::{SessionStore, StoreResult};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now < deadline,
            None => true,
        }
    }
}

/// In-memory TTL key-value store.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Reads already ignore expired entries;
    /// this just reclaims memory and is safe to call at any time.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = resilient_write(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of live entries. Test and diagnostics helper.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        resilient_read(&self.entries)
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let entries = resilient_read(&self.entries);
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        resilient_write(&self.entries).insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        resilient_write(&self.entries).remove(key);
        Ok(())
    }

    fn delete_if_present(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = resilient_write(&self.entries);
        match entries.remove(key) {
            Some(entry) => Ok(entry.is_live(now)),
            None => Ok(false),
        }
    }

    fn increment(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let now = Instant::now();
        let mut entries = resilient_write(&self.entries);
        let next = match entries.get(key).filter(|e| e.is_live(now)) {
            Some(entry) => entry.value.parse::<i64>().unwrap_or(0) + 1,
            None => 1,
        };
        // TTL is anchored at counter creation; bumps do not extend it.
        let expires_at = match entries.get(key).filter(|e| e.is_live(now)) {
            Some(entry) => entry.expires_at,
            None => Some(now + ttl),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let entries = resilient_read(&self.entries);
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
