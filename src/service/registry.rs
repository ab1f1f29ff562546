//! Name-keyed registries guarded by a read/write lock.

use std::collections::HashMap;

use parking_lot::RwLock;

/// A map from name to entry where the last insert wins.
///
/// Readers get cloned entries (usually `Arc`s), so no lock is held while a
/// handler or source runs.
pub(crate) struct Registry<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V: Clone> Registry<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace. Returns the replaced entry.
    pub(crate) fn insert(&self, name: String, entry: V) -> Option<V> {
        self.entries.write().insert(name, entry)
    }

    pub(crate) fn get(&self, name: &str) -> Option<V> {
        self.entries.read().get(name).cloned()
    }

    /// Apply `f` to the entry for `name`, if present.
    pub(crate) fn update(&self, name: &str, f: impl FnOnce(&mut V)) {
        if let Some(entry) = self.entries.write().get_mut(name) {
            f(entry);
        }
    }

    /// Sorted key snapshot.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of all entries, sorted by name.
    pub(crate) fn entries(&self) -> Vec<(String, V)> {
        let mut entries: Vec<(String, V)> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
