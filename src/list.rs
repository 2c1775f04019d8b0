use std::hash::Hash;

use indexmap::IndexMap;

/// An ordered associative container mapping keys to values.
///
/// Backed by `indexmap::IndexMap`, which gives insertion-order iteration and
/// amortized O(1) lookup — registration order is the only thing callers can
/// observe indirectly through delivery scheduling, so preserving it cheaply
/// matters more here than in a general-purpose map.
#[derive(Debug)]
pub struct KeyedList<K, V> {
    map: IndexMap<K, V>,
}

impl<K, V> KeyedList<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> KeyedList<K, V> {
        KeyedList { map: IndexMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Appends `(key, value)`. Returns `false` without modifying the list if
    /// `key` is already present — callers are expected to guarantee
    /// uniqueness up front (e.g. via a live-table membership check) and treat
    /// this as a bug signal, not a routine outcome.
    pub fn add(&mut self, key: K, value: V) -> bool {
        if self.map.contains_key(&key) {
            return false;
        }
        self.map.insert(key, value);
        true
    }

    pub fn find(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        self.map.get_mut(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Removes `key` if present, preserving the relative order of the
    /// remaining entries (`shift_remove`, not the swap-remove `IndexMap`
    /// otherwise defaults to — order matters here because it's the only
    /// record of registration order callers can observe indirectly through
    /// delivery scheduling).
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.shift_remove(key)
    }

    pub fn remove_all(&mut self) {
        self.map.clear();
    }

    /// Calls `f(key, value)` for each entry in insertion order, stopping
    /// early if `f` returns `false`.
    ///
    /// The key list is snapshotted before the first call so that `f`
    /// requesting removal of the *current* entry through a side channel (the
    /// deferred queue, never this list directly) cannot invalidate iteration:
    /// a snapshotted key that no longer resolves via `find` is simply skipped.
    pub fn iterate<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let keys: Vec<K> = self.map.keys().cloned().collect();
        for key in &keys {
            let Some(value) = self.map.get(key) else {
                continue;
            };
            if !f(key, value) {
                break;
            }
        }
    }
}

impl<K, V> Default for KeyedList<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        KeyedList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rejects_duplicate_keys() {
        let mut list = KeyedList::new();
        assert!(list.add(1, "a"));
        assert!(!list.add(1, "b"));
        assert_eq!(list.find(&1), Some(&"a"));
    }

    #[test]
    fn iterate_visits_in_insertion_order() {
        let mut list = KeyedList::new();
        list.add(1, "a");
        list.add(2, "b");
        list.add(3, "c");

        let mut seen = Vec::new();
        list.iterate(|k, v| {
            seen.push((*k, *v));
            true
        });

        assert_eq!(seen, vec![(1, "a"), (2, "b"), (3, "c")]);
    }

    #[test]
    fn iterate_stops_early_when_f_returns_false() {
        let mut list = KeyedList::new();
        list.add(1, "a");
        list.add(2, "b");
        list.add(3, "c");

        let mut seen = Vec::new();
        list.iterate(|k, v| {
            seen.push((*k, *v));
            *k != 2
        });

        assert_eq!(seen, vec![(1, "a"), (2, "b")]);
    }

    #[test]
    fn remove_preserves_relative_order_of_survivors() {
        let mut list = KeyedList::new();
        list.add(1, "a");
        list.add(2, "b");
        list.add(3, "c");
        list.remove(&2);

        let mut seen = Vec::new();
        list.iterate(|k, v| {
            seen.push((*k, *v));
            true
        });
        assert_eq!(seen, vec![(1, "a"), (3, "c")]);
    }

    #[test]
    fn iterate_tolerates_removal_of_current_entry_mid_iteration() {
        let mut list = KeyedList::new();
        list.add(1, "a");
        list.add(2, "b");
        list.add(3, "c");

        let mut seen = Vec::new();
        let mut to_remove: Option<i32> = None;
        list.iterate(|k, v| {
            seen.push((*k, *v));
            if *k == 1 {
                to_remove = Some(1);
            }
            true
        });
        if let Some(k) = to_remove {
            list.remove(&k);
        }

        assert_eq!(seen, vec![(1, "a"), (2, "b"), (3, "c")]);
        assert_eq!(list.len(), 2);
    }
}
