//! Handle-keyed storage for parsed queries and registered subscriptions.

use std::collections::BTreeMap;

/// A registry mapping opaque integer handles to entries.
///
/// Handles are allocated as the largest live handle plus one, starting at 1,
/// so a handle is never ambiguous with a smaller discarded one. Clearing the
/// registry restarts the numbering.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    entries: BTreeMap<i32, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Stores an entry under a freshly allocated handle.
    pub fn insert(&mut self, entry: T) -> i32 {
        let handle = self
            .entries
            .last_key_value()
            .map_or(1, |(handle, _)| handle + 1);
        self.entries.insert(handle, entry);
        handle
    }

    /// Looks up an entry.
    pub fn get(&self, handle: i32) -> Option<&T> {
        self.entries.get(&handle)
    }

    /// Removes an entry, returning it if the handle was known.
    pub fn remove(&mut self, handle: i32) -> Option<T> {
        self.entries.remove(&handle)
    }

    /// Empties the registry, yielding every entry.
    pub fn drain(&mut self) -> impl Iterator<Item = T> {
        std::mem::take(&mut self.entries).into_values()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_starts_at_one() {
        let mut registry = Registry::new();
        assert_eq!(registry.insert("a"), 1);
        assert_eq!(registry.insert("b"), 2);
        assert_eq!(registry.insert("c"), 3);
    }

    #[test]
    fn test_allocation_is_max_live_plus_one() {
        let mut registry = Registry::new();
        registry.insert("a");
        registry.insert("b");
        registry.insert("c");

        // Discarding a smaller handle never causes reuse.
        assert_eq!(registry.remove(2), Some("b"));
        assert_eq!(registry.insert("d"), 4);
        assert_eq!(registry.get(2), None);
        assert_eq!(registry.get(3), Some(&"c"));
    }

    #[test]
    fn test_numbering_restarts_after_drain() {
        let mut registry = Registry::new();
        registry.insert("a");
        registry.insert("b");

        let drained: Vec<_> = registry.drain().collect();
        assert_eq!(drained, vec!["a", "b"]);
        assert!(registry.is_empty());
        assert_eq!(registry.insert("c"), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let mut registry = Registry::<&str>::new();
        assert_eq!(registry.remove(7), None);
    }
}
