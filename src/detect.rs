//! Change detection between a live window and its stored record.

use tracing::trace;
use tracing::warn;

use crate::snapshot::LayoutSnapshot;
use crate::types::WindowRecord;

/// Outcome of comparing an observed window against the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Change {
    /// No record exists for the window's key.
    New,
    Unchanged,
    /// Same process, different screen rectangle or placement.
    Changed,
    /// The key's record belongs to another process: the OS reused a dead
    /// window's handle.
    Collision,
}

impl Change {
    /// Whether the observed record must be written back to the snapshot.
    #[must_use]
    pub const fn needs_commit(self) -> bool { !matches!(self, Self::Unchanged) }
}

/// Classify `observed` against `previous` without touching any snapshot.
#[must_use]
pub fn classify(previous: Option<&WindowRecord>, observed: &WindowRecord) -> Change {
    let Some(previous) = previous else {
        return Change::New;
    };

    if previous.process_id != observed.process_id {
        Change::Collision
    } else if previous.screen_rect != observed.screen_rect
        || !previous.placement.same_normal_state(&observed.placement)
    {
        Change::Changed
    } else {
        Change::Unchanged
    }
}

/// Classify `observed` against `snapshot`, evicting the stored record on a
/// handle collision so the observed record can replace it.
pub fn detect(snapshot: &mut LayoutSnapshot, observed: &WindowRecord) -> Change {
    let key = observed.key();
    let change = classify(snapshot.get(&key), observed);

    match change {
        Change::Collision => {
            if let Some(stale) = snapshot.remove(&key) {
                warn!(
                    "[detect] {} process id changed from {} to {}, dropping stale record",
                    key, stale.process_id, observed.process_id
                );
            }
        },
        Change::New => trace!("[detect] window is new: {}", observed),
        Change::Changed => trace!("[detect] window geometry changed: {}", observed),
        Change::Unchanged => trace!("[detect] window unchanged: {}", observed),
    }

    change
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Placement;
    use crate::types::Rect;
    use crate::types::ShowState;
    use crate::types::WindowHandle;

    fn record(process_id: u32, rect: Rect) -> WindowRecord {
        WindowRecord {
            handle: WindowHandle(0x10),
            process_id,
            process_name: "editor".to_string(),
            screen_rect: rect,
            placement: Placement {
                normal_rect: rect,
                ..Placement::default()
            },
        }
    }

    fn snapshot_with(existing: WindowRecord) -> LayoutSnapshot {
        let mut snapshot = LayoutSnapshot::default();
        snapshot.insert(existing);
        snapshot
    }

    #[test]
    fn unknown_key_is_new() {
        let mut snapshot = LayoutSnapshot::default();
        let observed = record(5, Rect::new(0, 0, 800, 600));
        assert_eq!(detect(&mut snapshot, &observed), Change::New);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn identical_record_is_unchanged() {
        let stored = record(5, Rect::new(0, 0, 800, 600));
        let mut snapshot = snapshot_with(stored.clone());
        assert_eq!(detect(&mut snapshot, &stored), Change::Unchanged);
        assert!(!Change::Unchanged.needs_commit());
    }

    #[test]
    fn moved_window_is_changed() {
        let mut snapshot = snapshot_with(record(5, Rect::new(0, 0, 800, 600)));
        let observed = record(5, Rect::new(100, 0, 800, 600));
        assert_eq!(detect(&mut snapshot, &observed), Change::Changed);
    }

    #[test]
    fn show_state_change_alone_is_changed() {
        let stored = record(5, Rect::new(0, 0, 800, 600));
        let mut observed = stored.clone();
        observed.placement = observed.placement.with_show_state(ShowState::Minimized);
        assert_eq!(classify(Some(&stored), &observed), Change::Changed);
    }

    #[test]
    fn reused_handle_is_collision_and_evicts_old_record() {
        let mut snapshot = snapshot_with(record(5, Rect::new(0, 0, 800, 600)));
        let observed = record(7, Rect::new(0, 0, 800, 600));

        assert_eq!(detect(&mut snapshot, &observed), Change::Collision);
        assert!(snapshot.get(&observed.key()).is_none());
        assert!(Change::Collision.needs_commit());
    }

    #[test]
    fn classify_leaves_snapshot_untouched_on_collision() {
        let stored = record(5, Rect::new(0, 0, 800, 600));
        let snapshot = snapshot_with(stored.clone());
        let observed = record(7, Rect::new(0, 0, 800, 600));

        assert_eq!(
            classify(snapshot.get(&observed.key()), &observed),
            Change::Collision
        );
        assert_eq!(snapshot.get(&stored.key()), Some(&stored));
    }
}
