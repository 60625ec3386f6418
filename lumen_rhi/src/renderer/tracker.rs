/// Attachment tracker: cached pass/framebuffer objects and the views they use
///
/// Uses a SlotMap for O(1) insert/remove with stable keys, plus a lookup
/// index by cache key. Each entry records the view ids it was built from so
/// a resize (or a dropped view) can evict every dependent object in one
/// sweep.

use std::hash::Hash;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{new_key_type, SlotMap};
use crate::renderer::ViewId;

new_key_type! {
    /// Stable key of a tracked object
    pub struct TrackedKey;
}

struct Tracked<K, T> {
    key: K,
    views: Vec<ViewId>,
    value: T,
}

/// Cache of objects keyed by `K`, each depending on a set of view ids
pub struct AttachmentTracker<K, T> {
    entries: SlotMap<TrackedKey, Tracked<K, T>>,
    index: FxHashMap<K, TrackedKey>,
}

impl<K: Hash + Eq + Clone, T> AttachmentTracker<K, T> {
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            index: FxHashMap::default(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&T> {
        self.index
            .get(key)
            .and_then(|slot| self.entries.get(*slot))
            .map(|tracked| &tracked.value)
    }

    /// Register `value` under `key`, returning any object it replaces
    pub fn insert(&mut self, key: K, views: Vec<ViewId>, value: T) -> Option<T> {
        let replaced = self.remove(&key);
        let slot = self.entries.insert(Tracked { key: key.clone(), views, value });
        self.index.insert(key, slot);
        replaced
    }

    pub fn remove(&mut self, key: &K) -> Option<T> {
        let slot = self.index.remove(key)?;
        self.entries.remove(slot).map(|tracked| tracked.value)
    }

    /// Remove every object depending on any of `views` and hand them back
    pub fn sweep(&mut self, views: &[ViewId]) -> Vec<T> {
        let doomed: Vec<TrackedKey> = self
            .entries
            .iter()
            .filter(|(_, tracked)| tracked.views.iter().any(|view| views.contains(view)))
            .map(|(slot, _)| slot)
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for slot in doomed {
            if let Some(tracked) = self.entries.remove(slot) {
                self.index.remove(&tracked.key);
                removed.push(tracked.value);
            }
        }
        removed
    }

    /// Remove everything
    pub fn drain(&mut self) -> Vec<T> {
        self.index.clear();
        self.entries.drain().map(|(_, tracked)| tracked.value).collect()
    }

    /// Every view id some tracked object depends on
    pub fn tracked_views(&self) -> FxHashSet<ViewId> {
        self.entries
            .values()
            .flat_map(|tracked| tracked.views.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Hash + Eq + Clone, T> Default for AttachmentTracker<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
