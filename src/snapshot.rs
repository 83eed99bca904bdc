//! Per-topology layout snapshots.
//!
//! The store maps each topology key to the last known good geometry of every
//! window seen under that topology. Snapshots live for the whole process and
//! are only discarded wholesale by [`SnapshotStore::clear_all`].

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::monitors::TopologyKey;
use crate::types::WindowKey;
use crate::types::WindowRecord;

/// Window records for one display topology, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayoutSnapshot {
    windows: BTreeMap<WindowKey, WindowRecord>,
}

impl LayoutSnapshot {
    #[must_use]
    pub fn get(&self, key: &WindowKey) -> Option<&WindowRecord> { self.windows.get(key) }

    #[must_use]
    pub fn len(&self) -> usize { self.windows.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.windows.is_empty() }

    pub fn iter(&self) -> btree_map::Values<'_, WindowKey, WindowRecord> { self.windows.values() }

    pub(crate) fn insert(&mut self, record: WindowRecord) {
        self.windows.insert(record.key(), record);
    }

    pub(crate) fn remove(&mut self, key: &WindowKey) -> Option<WindowRecord> {
        self.windows.remove(key)
    }

    /// Insert `record`, or update only the geometry of an existing record.
    ///
    /// Process identity is fixed once stored; a record owned by another
    /// process must be evicted first (see [`detect`](crate::detect())).
    fn upsert(&mut self, record: WindowRecord) {
        match self.windows.entry(record.key()) {
            btree_map::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.screen_rect = record.screen_rect;
                existing.placement = record.placement;
            },
            btree_map::Entry::Vacant(entry) => {
                entry.insert(record);
            },
        }
    }
}

/// Snapshots for every topology seen since the process started.
#[derive(Debug, Default, Serialize)]
pub struct SnapshotStore {
    layouts: BTreeMap<TopologyKey, LayoutSnapshot>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// The snapshot for `key`, created empty on first use.
    pub fn get_or_create(&mut self, key: &TopologyKey) -> &mut LayoutSnapshot {
        self.layouts.entry(key.clone()).or_insert_with(|| {
            info!("[get_or_create] new desktop topology '{}' identified", key);
            LayoutSnapshot::default()
        })
    }

    #[must_use]
    pub fn get(&self, key: &TopologyKey) -> Option<&LayoutSnapshot> { self.layouts.get(key) }

    /// Write captured records into the snapshot for `key`.
    ///
    /// Returns the number of records written.
    pub fn commit(&mut self, key: &TopologyKey, records: Vec<WindowRecord>) -> usize {
        let snapshot = self.get_or_create(key);
        let count = records.len();
        for record in records {
            snapshot.upsert(record);
        }
        count
    }

    /// Forget every snapshot. Used by manual recapture.
    pub fn clear_all(&mut self) {
        info!(
            "[clear_all] discarding {} captured topologies",
            self.layouts.len()
        );
        self.layouts.clear();
    }

    pub fn topologies(&self) -> impl Iterator<Item = &TopologyKey> { self.layouts.keys() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.layouts.is_empty() }
}

/// Lock the shared store, recovering it if a worker panicked while holding it.
pub(crate) fn lock_store(store: &Mutex<SnapshotStore>) -> MutexGuard<'_, SnapshotStore> {
    store.lock().unwrap_or_else(|poisoned| {
        warn!("[lock_store] snapshot store lock poisoned, recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::Placement;
    use crate::types::Rect;
    use crate::types::ShowState;
    use crate::types::WindowHandle;

    fn record(handle: isize, process_id: u32, rect: Rect) -> WindowRecord {
        WindowRecord {
            handle: WindowHandle(handle),
            process_id,
            process_name: "terminal".to_string(),
            screen_rect: rect,
            placement: Placement {
                normal_rect: rect,
                ..Placement::default()
            },
        }
    }

    #[test]
    fn commit_inserts_new_records() {
        let mut store = SnapshotStore::new();
        let key = TopologyKey::from("A");
        let written = store.commit(
            &key,
            vec![
                record(1, 10, Rect::new(0, 0, 800, 600)),
                record(2, 10, Rect::new(800, 0, 800, 600)),
            ],
        );

        assert_eq!(written, 2);
        assert_eq!(store.get(&key).map(LayoutSnapshot::len), Some(2));
    }

    #[test]
    fn commit_overwrites_geometry_but_keeps_identity() {
        let mut store = SnapshotStore::new();
        let key = TopologyKey::from("A");
        store.commit(&key, vec![record(1, 10, Rect::new(0, 0, 800, 600))]);

        let mut update = record(1, 99, Rect::new(50, 50, 640, 480));
        update.placement.show_state = ShowState::Maximized;
        store.commit(&key, vec![update.clone()]);

        let stored = store.get(&key).and_then(|s| s.get(&update.key())).unwrap();
        assert_eq!(stored.process_id, 10);
        assert_eq!(stored.screen_rect, Rect::new(50, 50, 640, 480));
        assert_eq!(stored.placement, update.placement);
    }

    #[test]
    fn topologies_are_independent() {
        let mut store = SnapshotStore::new();
        let a = TopologyKey::from("A");
        let b = TopologyKey::from("B");
        store.commit(&a, vec![record(1, 10, Rect::new(0, 0, 800, 600))]);
        store.commit(&b, vec![record(1, 10, Rect::new(1920, 0, 800, 600))]);

        store.commit(&b, vec![record(1, 10, Rect::new(2000, 100, 800, 600))]);

        let key = record(1, 10, Rect::default()).key();
        assert_eq!(
            store.get(&a).and_then(|s| s.get(&key)).map(|r| r.screen_rect),
            Some(Rect::new(0, 0, 800, 600))
        );
        assert_eq!(
            store.get(&b).and_then(|s| s.get(&key)).map(|r| r.screen_rect),
            Some(Rect::new(2000, 100, 800, 600))
        );
    }

    #[test]
    fn get_or_create_is_lazy_and_clear_all_resets() {
        let mut store = SnapshotStore::new();
        let key = TopologyKey::from("A");
        assert!(store.get(&key).is_none());

        assert!(store.get_or_create(&key).is_empty());
        assert_eq!(store.topologies().count(), 1);

        store.clear_all();
        assert!(store.is_empty());
    }
}
