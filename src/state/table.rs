// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A table of independently locked entries keyed by a context name.
///
/// The table lock only guards membership; each entry carries its own lock, so work
/// on one context never blocks another. Lookups of existing entries take the table
/// read lock; only first use of a key takes the write lock.
///
/// Entries live until [`KeyedTable::evict`] or [`KeyedTable::clear`] is called.
pub struct KeyedTable<T> {
    entries: RwLock<HashMap<String, Arc<RwLock<T>>>>,
}

impl<T> KeyedTable<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The entry for `key`, created with `init` on first use.
    pub fn get_or_insert_with(&self, key: &str, init: impl FnOnce() -> T) -> Arc<RwLock<T>> {
        if let Some(entry) = self.entries.read().get(key) {
            return entry.clone();
        }

        let mut entries = self.entries.write();
        entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(init())))
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<RwLock<T>>> {
        self.entries.read().get(key).cloned()
    }

    pub fn evict(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Every entry, for sweeps that touch all of them.
    pub fn values(&self) -> Vec<Arc<RwLock<T>>> {
        self.entries.read().values().cloned().collect()
    }
}

impl<T> Default for KeyedTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for KeyedTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedTable")
            .field("len", &self.len())
            .finish()
    }
}
