//! Named per-channel mutual exclusion framing each link unit of work.
//!
//! The engine assumes a single active instance, so the advisory lock of the
//! original design is an in-process table of async mutexes keyed by
//! `LockKey`. A guard is held for the whole duration of one lifecycle
//! operation, remote-call latency included.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tether_core::LockKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{LinkStoreError, StoreResult};

/// Lazily-populated table of named async mutexes.
///
/// Entries are created on first use and kept for the lifetime of the table;
/// the key space is bounded by the number of voice channels ever seen.
#[derive(Debug, Default)]
pub struct KeyLockTable {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held guard for one key; dropping it releases the lock.
#[derive(Debug)]
pub struct KeyLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `key`, waiting behind any holder of the same
    /// key. Locks for distinct keys never contend.
    pub async fn acquire(&self, key: &LockKey) -> StoreResult<KeyLockGuard> {
        let entry = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| LinkStoreError::LockTablePoisoned)?;
            entries
                .entry(key.as_str().to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        Ok(KeyLockGuard {
            _guard: entry.lock_owned().await,
        })
    }
}
