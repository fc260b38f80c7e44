//! Keyed snapshot container for nodes, instances and groups.
//!
//! Snapshots are treated as persistent values: every "modification"
//! returns a new container and never aliases the caller's copy. The
//! implementation is a copy-on-write ordered map, so iteration order is
//! always ascending by index and therefore deterministic.

use std::collections::BTreeMap;

/// An element that can be stored in a [`Container`]: it knows its own
/// index and carries a display name.
pub trait Element: Clone {
    fn index(&self) -> usize;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Container<T: Element> {
    items: BTreeMap<usize, T>,
}

impl<T: Element> Container<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// Builds a container from a list of elements, keyed by their own
    /// indices.
    pub fn from_list(items: Vec<T>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.index(), i)).collect(),
        }
    }

    /// Looks up an element by index.
    ///
    /// Every index stored in a snapshot must resolve; a missing index is
    /// a programmer error, not a recoverable condition.
    pub fn find(&self, idx: usize) -> &T {
        self.items
            .get(&idx)
            .unwrap_or_else(|| panic!("container lookup failed for index {}", idx))
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.items.get(&idx)
    }

    /// Returns a new container with the element replaced (or inserted)
    /// under its own index.
    pub fn add(&self, item: T) -> Self {
        let mut items = self.items.clone();
        items.insert(item.index(), item);
        Self { items }
    }

    /// Replaces two elements atomically, a single copy of the map.
    pub fn add_two(&self, a: T, b: T) -> Self {
        let mut items = self.items.clone();
        items.insert(a.index(), a);
        items.insert(b.index(), b);
        Self { items }
    }

    pub fn elems(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.values()
    }

    pub fn keys(&self) -> Vec<usize> {
        self.items.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn name_of(&self, idx: usize) -> &str {
        self.find(idx).name()
    }
}

impl<T: Element> Default for Container<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> FromIterator<T> for Container<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(|i| (i.index(), i)).collect(),
        }
    }
}
