//! Key pool and cursor
//!
//! The key list is fixed at construction; the only mutable state is the
//! cursor, an index into the list marking the last key that completed a
//! generation. It is held as an atomic so `snapshot`/`commit` are O(1) and
//! can never block an upstream call or deadlock under parallel dispatches.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use crate::error::{Error, Result};
use crate::key::ApiKey;

/// Ordered API keys plus the shared "last known good" cursor.
///
/// Construct once at startup and share via `Arc`. The cursor invariant
/// `0 <= cursor < len` holds at all times: the initial value is 0 and
/// `commit` reduces its argument modulo the pool size.
pub struct KeyPool {
    keys: Vec<ApiKey>,
    cursor: AtomicUsize,
}

impl KeyPool {
    /// Build a pool from the configured keys. Fails on an empty list — a
    /// proxy with zero keys cannot serve anything.
    pub fn new(keys: Vec<ApiKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::NoKeys);
        }
        info!(keys = keys.len(), "key pool initialized");
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Current cursor value — the rotation start for the next dispatch.
    pub fn snapshot(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Record `index` as the last known good key.
    ///
    /// Idempotent; concurrent commits race and the last write wins, which is
    /// acceptable — a stale cursor only costs a suboptimal starting key.
    pub fn commit(&self, index: usize) {
        self.cursor.store(index % self.keys.len(), Ordering::Release);
    }

    /// Number of keys in the pool.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key at `index`. Callers reduce modulo `len()` first; the pool itself
    /// does not wrap.
    pub fn key_at(&self, index: usize) -> &ApiKey {
        &self.keys[index]
    }
}
