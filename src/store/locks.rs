// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Poisoning-recovering lock helpers for the in-memory store.
//!
//! A thread that panics while holding a write lock poisons it. For a
//! security engine sitting on the request path, refusing every
//! subsequent request over possibly-stale map contents is a worse
//! outcome than serving them, so these helpers log the event and
//! recover the guard instead of propagating the panic.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "riskgate::store",
                event = "LOCK_POISONED_READ",
                "store lock was poisoned during read acquisition; recovering. \
                 A thread previously panicked while holding this lock."
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "riskgate::store",
                event = "LOCK_POISONED_WRITE",
                "store lock was poisoned during write acquisition; recovering. \
                 A thread previously panicked while holding this lock."
            );
            poisoned.into_inner()
        }
    }
}
