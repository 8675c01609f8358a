//! # Payload Store
//!
//! Frame-scoped, lazily-initialized keyed value store.
//!
//! Stages use it for "has this already run this frame" dedup counters and
//! for one-shot signaling between stages. Each entry carries a persistence
//! flag: `reset()` discards every transient entry and keeps persistent ones,
//! so a `LastCalled` stamp survives from frame to frame while per-frame
//! call counters start over.
//!
//! Entries are type-erased. Reading an entry back with a different type
//! than it was stored with is reported as `StageError::PayloadTypeMismatch`
//! instead of returning a wrong value.

use crate::types::StageError;
use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// ENTRY
// =============================================================================

struct PayloadEntry {
    value: Box<dyn Any>,
    persistent: bool,
    type_name: &'static str,
}

impl PayloadEntry {
    fn new<T: Any>(value: T, persistent: bool) -> Self {
        Self {
            value: Box::new(value),
            persistent,
            type_name: type_name::<T>(),
        }
    }

    fn mismatch<T: Any>(&self, key: &str) -> StageError {
        StageError::PayloadTypeMismatch {
            key: key.to_string(),
            stored: self.type_name,
            requested: type_name::<T>(),
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Keyed, type-erased store with persistent and transient entries.
#[derive(Default)]
pub struct PayloadStore {
    entries: BTreeMap<String, PayloadEntry>,
}

impl fmt::Debug for PayloadStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(k, e)| (k, (e.type_name, e.persistent))),
            )
            .finish()
    }
}

impl PayloadStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for `key`, creating it with `default` on first access.
    ///
    /// `persistent` only applies when the entry is created.
    pub fn get<T: Any>(
        &mut self,
        key: &str,
        persistent: bool,
        default: T,
    ) -> Result<&mut T, StageError> {
        self.get_or_insert_with(key, persistent, || default)
    }

    /// Get the entry for `key`, creating it from `init` on first access.
    ///
    /// `init` runs at most once per entry lifetime.
    pub fn get_or_insert_with<T: Any>(
        &mut self,
        key: &str,
        persistent: bool,
        init: impl FnOnce() -> T,
    ) -> Result<&mut T, StageError> {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| PayloadEntry::new(init(), persistent));
        let stored = entry.type_name;
        entry
            .value
            .downcast_mut::<T>()
            .ok_or_else(|| StageError::PayloadTypeMismatch {
                key: key.to_string(),
                stored,
                requested: type_name::<T>(),
            })
    }

    /// Insert or overwrite the entry for `key`.
    pub fn set<T: Any>(&mut self, key: &str, persistent: bool, value: T) {
        self.entries
            .insert(key.to_string(), PayloadEntry::new(value, persistent));
    }

    /// Read-and-remove. Returns `None` when the entry does not exist.
    ///
    /// An entry of another type is left in place and reported as a mismatch.
    pub fn consume<T: Any>(&mut self, key: &str) -> Result<Option<T>, StageError> {
        match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.value.is::<T>() => return Err(entry.mismatch::<T>(key)),
            Some(_) => {}
        }

        let Some(entry) = self.entries.remove(key) else {
            return Ok(None);
        };
        let stored = entry.type_name;
        entry
            .value
            .downcast::<T>()
            .map(|boxed| Some(*boxed))
            .map_err(|_| StageError::PayloadTypeMismatch {
                key: key.to_string(),
                stored,
                requested: type_name::<T>(),
            })
    }

    /// Read an existing entry without creating it.
    pub fn peek<T: Any>(&self, key: &str) -> Result<Option<&T>, StageError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => entry
                .value
                .downcast_ref::<T>()
                .map(Some)
                .ok_or_else(|| entry.mismatch::<T>(key)),
        }
    }

    /// Remove an entry regardless of its type. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Discard every non-persistent entry.
    pub fn reset(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.persistent);
        tracing::trace!(
            discarded = before.saturating_sub(self.entries.len()),
            kept = self.entries.len(),
            "payload store reset"
        );
    }

    /// Whether an entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether the entry for `key` exists and is persistent.
    #[must_use]
    pub fn is_persistent(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.persistent)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys in deterministic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

// =============================================================================
// TESTS
// =============================================================================
