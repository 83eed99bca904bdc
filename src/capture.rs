//! Capture pass: read every window of interest and commit what changed.

use std::fmt;
use std::sync::Mutex;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::detect::Change;
use crate::detect::detect;
use crate::error::PlatformError;
use crate::platform::DisplayTopology;
use crate::platform::WindowInventory;
use crate::snapshot::SnapshotStore;
use crate::snapshot::lock_store;
use crate::types::WindowInfo;
use crate::types::WindowRecord;

/// Which records a capture pass writes back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureMode {
    /// Commit only new, changed and collided windows.
    #[default]
    Incremental,
    /// Commit every window. Used for the first capture at startup.
    Initial,
}

/// Per-pass counts, one bucket per window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub new:        usize,
    pub changed:    usize,
    pub collisions: usize,
    pub unchanged:  usize,
    /// Windows whose geometry could not be read.
    pub skipped:    usize,
}

impl CaptureReport {
    /// Records written to the snapshot in [`CaptureMode::Incremental`].
    #[must_use]
    pub const fn changes(&self) -> usize { self.new + self.changed + self.collisions }

    const fn count(&mut self, change: Change) {
        match change {
            Change::New => self.new += 1,
            Change::Changed => self.changed += 1,
            Change::Collision => self.collisions += 1,
            Change::Unchanged => self.unchanged += 1,
        }
    }
}

impl fmt::Display for CaptureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} changed, {} collisions, {} unchanged, {} skipped",
            self.new, self.changed, self.collisions, self.unchanged, self.skipped
        )
    }
}

/// Read the live geometry of one window.
///
/// # Errors
///
/// Returns an error if the window's placement or rectangle cannot be read.
pub fn read_window<I>(inventory: &I, info: &WindowInfo) -> Result<WindowRecord, PlatformError>
where
    I: WindowInventory + ?Sized,
{
    let placement = inventory.placement(info.handle)?;
    let screen_rect = inventory.screen_rect(info.handle)?;
    Ok(WindowRecord {
        handle: info.handle,
        process_id: info.process.id,
        process_name: info.process.name.clone(),
        screen_rect,
        placement,
    })
}

/// Capture the current layout into the snapshot of the current topology.
///
/// Holds the store lock for the whole pass, so no restore can interleave.
///
/// # Errors
///
/// Returns an error if the topology or the window list cannot be read. A
/// failure reading a single window only skips that window.
pub fn capture_pass<I, T>(
    store: &Mutex<SnapshotStore>,
    inventory: &I,
    topology: &T,
    mode: CaptureMode,
) -> Result<CaptureReport, PlatformError>
where
    I: WindowInventory + ?Sized,
    T: DisplayTopology + ?Sized,
{
    let mut store = lock_store(store);
    let key = topology.topology_key()?;
    let windows = inventory.windows_of_interest()?;

    let mut report = CaptureReport::default();
    let mut pending = Vec::new();
    let snapshot = store.get_or_create(&key);

    for info in &windows {
        let record = match read_window(inventory, info) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    "[capture_pass] skipping {} ({}): {}",
                    info.handle, info.process.name, err
                );
                report.skipped += 1;
                continue;
            },
        };

        let change = detect(snapshot, &record);
        report.count(change);
        if mode == CaptureMode::Initial || change.needs_commit() {
            pending.push(record);
        }
    }

    let committed = store.commit(&key, pending);
    if report.changes() > 0 || mode == CaptureMode::Initial {
        info!(
            "[capture_pass] {:?} capture committed {} windows ({})",
            mode, committed, report
        );
    } else {
        debug!("[capture_pass] no changes ({})", report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::platform::fake::FakeDesktop;
    use crate::types::Rect;
    use crate::types::WindowHandle;
    use crate::types::WindowKey;

    fn desktop() -> FakeDesktop {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(WindowHandle(1), 10, "editor", Rect::new(0, 0, 800, 600));
        desktop.add_window(WindowHandle(2), 20, "browser", Rect::new(100, 100, 1024, 768));
        desktop
    }

    fn stored_rect(store: &Mutex<SnapshotStore>, desktop: &FakeDesktop, key: &WindowKey) -> Option<Rect> {
        let topology = desktop.topology_key().unwrap();
        lock_store(store)
            .get(&topology)
            .and_then(|snapshot| snapshot.get(key))
            .map(|record| record.screen_rect)
    }

    #[test]
    fn first_pass_records_every_window() {
        let desktop = desktop();
        let store = Mutex::new(SnapshotStore::new());

        let report = capture_pass(&store, &desktop, &desktop, CaptureMode::Incremental).unwrap();
        assert_eq!(report.new, 2);
        assert_eq!(
            stored_rect(&store, &desktop, &WindowKey::new(WindowHandle(2), "browser")),
            Some(Rect::new(100, 100, 1024, 768))
        );
    }

    #[test]
    fn repeated_capture_of_still_windows_changes_nothing() {
        let desktop = desktop();
        let store = Mutex::new(SnapshotStore::new());
        capture_pass(&store, &desktop, &desktop, CaptureMode::Incremental).unwrap();
        let before = lock_store(&store).get(&desktop.topology_key().unwrap()).cloned();

        let report = capture_pass(&store, &desktop, &desktop, CaptureMode::Incremental).unwrap();
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.changes(), 0);
        assert_eq!(lock_store(&store).get(&desktop.topology_key().unwrap()).cloned(), before);
    }

    #[test]
    fn moved_window_is_committed() {
        let desktop = desktop();
        let store = Mutex::new(SnapshotStore::new());
        capture_pass(&store, &desktop, &desktop, CaptureMode::Incremental).unwrap();

        desktop.move_window(WindowHandle(1), Rect::new(300, 200, 800, 600));
        let report = capture_pass(&store, &desktop, &desktop, CaptureMode::Incremental).unwrap();

        assert_eq!(report.changed, 1);
        assert_eq!(
            stored_rect(&store, &desktop, &WindowKey::new(WindowHandle(1), "editor")),
            Some(Rect::new(300, 200, 800, 600))
        );
    }

    #[test]
    fn reused_handle_replaces_stale_record() {
        let desktop = desktop();
        let store = Mutex::new(SnapshotStore::new());
        capture_pass(&store, &desktop, &desktop, CaptureMode::Incremental).unwrap();

        desktop.remove_window(WindowHandle(1));
        desktop.add_window(WindowHandle(1), 77, "editor", Rect::new(5, 5, 640, 480));
        let report = capture_pass(&store, &desktop, &desktop, CaptureMode::Incremental).unwrap();
        assert_eq!(report.collisions, 1);

        let topology = desktop.topology_key().unwrap();
        let guard = lock_store(&store);
        let record = guard
            .get(&topology)
            .and_then(|s| s.get(&WindowKey::new(WindowHandle(1), "editor")))
            .unwrap();
        assert_eq!(record.process_id, 77);
        assert_eq!(record.screen_rect, Rect::new(5, 5, 640, 480));
    }

    #[test]
    fn unreadable_window_is_skipped() {
        let desktop = desktop();
        desktop.fail_window(WindowHandle(2));
        let store = Mutex::new(SnapshotStore::new());

        let report = capture_pass(&store, &desktop, &desktop, CaptureMode::Incremental).unwrap();
        assert_eq!(report.new, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn failed_enumeration_is_an_error() {
        let desktop = desktop();
        desktop.fail_enumeration(true);
        let store = Mutex::new(SnapshotStore::new());

        assert!(capture_pass(&store, &desktop, &desktop, CaptureMode::Initial).is_err());
    }
}
