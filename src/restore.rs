//! Restore pass: reapply saved geometry to live windows.
//!
//! A saved placement is replayed through a fixed sequence of calls. Windows
//! that were minimized or maximized are first set back to normal with their
//! saved normal rectangle, then switched to their saved show-state, so the OS
//! remembers the right geometry to return to. Windows that end up in the
//! normal state (which includes snapped windows) additionally get their exact
//! screen rectangle.

use std::fmt;
use std::sync::Mutex;

use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::capture::read_window;
use crate::detect::Change;
use crate::detect::classify;
use crate::error::PlatformError;
use crate::platform::DisplayTopology;
use crate::platform::SetRectFlags;
use crate::platform::WindowInventory;
use crate::snapshot::SnapshotStore;
use crate::snapshot::lock_store;
use crate::types::ShowState;
use crate::types::WindowInfo;
use crate::types::WindowKey;
use crate::types::WindowRecord;

/// Per-pass counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored:  usize,
    /// Windows already at their saved geometry.
    pub unchanged: usize,
    /// Denylisted, unknown, or now owned by another process.
    pub skipped:   usize,
    pub failures:  usize,
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} restored, {} unchanged, {} skipped, {} failed",
            self.restored, self.unchanged, self.skipped, self.failures
        )
    }
}

fn is_denylisted(info: &WindowInfo, denylist: &[String]) -> bool {
    denylist
        .iter()
        .any(|entry| !entry.is_empty() && info.process.name.contains(entry.as_str()))
}

/// Restore the layout saved for the current display topology.
///
/// The topology is read while the store is locked. Does nothing when no
/// layout was ever captured for it; the store itself is never modified.
///
/// # Errors
///
/// Returns an error if the monitors or the window list cannot be enumerated.
/// Failures on individual windows are counted in the report and do not stop
/// the pass.
pub fn restore_pass<I, T>(
    store: &Mutex<SnapshotStore>,
    inventory: &I,
    topology: &T,
    denylist: &[String],
) -> Result<RestoreReport, PlatformError>
where
    I: WindowInventory + ?Sized,
    T: DisplayTopology + ?Sized,
{
    let store = lock_store(store);
    let topology_key = topology.topology_key()?;
    let mut report = RestoreReport::default();

    let Some(snapshot) = store.get(&topology_key).filter(|s| !s.is_empty()) else {
        info!(
            "[restore_pass] no layout captured for topology '{}'",
            topology_key
        );
        return Ok(report);
    };

    let windows = inventory.windows_of_interest()?;
    debug!(
        "[restore_pass] restoring up to {} windows for '{}'",
        windows.len(),
        topology_key
    );

    for info in &windows {
        if is_denylisted(info, denylist) {
            debug!(
                "[restore_pass] skipping denylisted {} ({})",
                info.handle, info.process.name
            );
            report.skipped += 1;
            continue;
        }

        let key = WindowKey::new(info.handle, info.process.name.as_str());
        let Some(saved) = snapshot.get(&key) else {
            trace!("[restore_pass] no saved record for {}", key);
            report.skipped += 1;
            continue;
        };

        let live = match read_window(inventory, info) {
            Ok(live) => live,
            Err(err) => {
                warn!("[restore_pass] cannot read {}: {}", key, err);
                report.failures += 1;
                continue;
            },
        };

        match classify(Some(saved), &live) {
            Change::Unchanged => {
                trace!("[restore_pass] {} already in place", key);
                report.unchanged += 1;
            },
            Change::Collision => {
                debug!(
                    "[restore_pass] {} now belongs to process {}, skipping",
                    key, live.process_id
                );
                report.skipped += 1;
            },
            Change::New | Change::Changed => match apply_saved(inventory, saved) {
                Ok(()) => {
                    debug!(
                        "[restore_pass] restored {} to {} ({:?})",
                        key, saved.screen_rect, saved.placement.show_state
                    );
                    report.restored += 1;
                },
                Err(err) => {
                    warn!(
                        "[restore_pass] failed to restore {}: {} (error code {:?})",
                        key,
                        err,
                        err.code()
                    );
                    report.failures += 1;
                },
            },
        }
    }

    info!("[restore_pass] {}", report);
    Ok(report)
}

/// Replay one saved record.
fn apply_saved<I>(inventory: &I, saved: &WindowRecord) -> Result<(), PlatformError>
where
    I: WindowInventory + ?Sized,
{
    let placement = saved.placement;

    if placement.show_state != ShowState::Normal {
        inventory.set_placement(saved.handle, &placement.with_show_state(ShowState::Normal))?;
    }
    inventory.set_placement(saved.handle, &placement)?;

    if !placement.show_state.is_min_or_max() {
        inventory.set_window_rect(
            saved.handle,
            saved.screen_rect,
            SetRectFlags::NO_Z_ORDER | SetRectFlags::ASYNC,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::capture::CaptureMode;
    use crate::capture::capture_pass;
    use crate::monitors::MonitorInfo;
    use crate::platform::fake::Call;
    use crate::platform::fake::FakeDesktop;
    use crate::types::Placement;
    use crate::types::Rect;
    use crate::types::WindowHandle;

    const EDITOR: WindowHandle = WindowHandle(1);

    fn captured(desktop: &FakeDesktop) -> Mutex<SnapshotStore> {
        let store = Mutex::new(SnapshotStore::new());
        capture_pass(&store, desktop, desktop, CaptureMode::Initial).unwrap();
        desktop.clear_calls();
        store
    }

    fn restore(store: &Mutex<SnapshotStore>, desktop: &FakeDesktop, denylist: &[String]) -> RestoreReport {
        restore_pass(store, desktop, desktop, denylist).unwrap()
    }

    fn docked_monitors() -> Vec<MonitorInfo> {
        vec![
            MonitorInfo::new(r"\\.\DISPLAY1", Rect::new(0, 0, 1920, 1080), true),
            MonitorInfo::new(r"\\.\DISPLAY2", Rect::new(1920, 0, 2560, 1440), false),
        ]
    }

    #[test]
    fn moved_normal_window_gets_placement_and_rect() {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(EDITOR, 10, "editor", Rect::new(0, 0, 800, 600));
        let store = captured(&desktop);

        desktop.move_window(EDITOR, Rect::new(400, 300, 800, 600));
        let report = restore(&store, &desktop, &[]);

        assert_eq!(report.restored, 1);
        assert_eq!(
            desktop.calls(),
            vec![
                Call::SetPlacement(
                    EDITOR,
                    Placement {
                        normal_rect: Rect::new(0, 0, 800, 600),
                        ..Placement::default()
                    }
                ),
                Call::SetWindowRect(
                    EDITOR,
                    Rect::new(0, 0, 800, 600),
                    SetRectFlags::NO_Z_ORDER | SetRectFlags::ASYNC
                ),
            ]
        );
        assert_eq!(desktop.screen_rect(EDITOR).unwrap(), Rect::new(0, 0, 800, 600));
    }

    #[test]
    fn maximized_window_is_toggled_through_normal() {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(EDITOR, 10, "editor", Rect::new(100, 100, 800, 600));
        desktop.set_show_state(EDITOR, ShowState::Maximized);
        let store = captured(&desktop);

        desktop.set_show_state(EDITOR, ShowState::Normal);
        let report = restore(&store, &desktop, &[]);

        assert_eq!(report.restored, 1);
        let calls = desktop.calls();
        let placements: Vec<ShowState> = calls
            .iter()
            .filter_map(|call| match call {
                Call::SetPlacement(_, placement) => Some(placement.show_state),
                Call::SetWindowRect(..) => None,
            })
            .collect();
        assert_eq!(placements, vec![ShowState::Normal, ShowState::Maximized]);
        assert!(!calls.iter().any(|call| matches!(call, Call::SetWindowRect(..))));
    }

    #[test]
    fn snapped_window_returns_to_snapped_rect() {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(EDITOR, 10, "editor", Rect::new(100, 100, 800, 600));
        let snapped = Rect::new(0, 0, 960, 1080);
        desktop.snap_window(EDITOR, snapped);
        let store = captured(&desktop);

        desktop.move_window(EDITOR, Rect::new(300, 200, 800, 600));
        let report = restore(&store, &desktop, &[]);

        assert_eq!(report.restored, 1);
        assert_eq!(
            desktop.calls().last(),
            Some(&Call::SetWindowRect(
                EDITOR,
                snapped,
                SetRectFlags::NO_Z_ORDER | SetRectFlags::ASYNC
            ))
        );
        assert_eq!(desktop.screen_rect(EDITOR).unwrap(), snapped);
    }

    #[test]
    fn unchanged_window_is_left_alone() {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(EDITOR, 10, "editor", Rect::new(0, 0, 800, 600));
        let store = captured(&desktop);

        let report = restore(&store, &desktop, &[]);
        assert_eq!(report.unchanged, 1);
        assert!(desktop.calls().is_empty());
    }

    #[test]
    fn denylisted_process_is_never_touched() {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(EDITOR, 10, "VSCodeSetup-x64", Rect::new(0, 0, 800, 600));
        let store = captured(&desktop);

        desktop.move_window(EDITOR, Rect::new(50, 50, 800, 600));
        let report = restore(&store, &desktop, &["CodeSetup".to_string()]);

        assert_eq!(report.skipped, 1);
        assert!(desktop.calls().is_empty());
    }

    #[test]
    fn unknown_topology_is_a_no_op() {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(EDITOR, 10, "editor", Rect::new(0, 0, 800, 600));
        let store = captured(&desktop);

        desktop.set_monitors(docked_monitors());
        desktop.move_window(EDITOR, Rect::new(2000, 100, 800, 600));
        let report = restore(&store, &desktop, &[]);

        assert_eq!(report, RestoreReport::default());
        assert_eq!(lock_store(&store).topologies().count(), 1);
        assert!(desktop.calls().is_empty());
    }

    #[test]
    fn topology_is_read_once_the_store_is_free() {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(EDITOR, 10, "editor", Rect::new(0, 0, 800, 600));
        desktop.set_monitors(docked_monitors());
        let store = captured(&desktop);

        desktop.set_monitors(vec![MonitorInfo::new(
            r"\\.\DISPLAY1",
            Rect::new(0, 0, 1920, 1080),
            true,
        )]);
        desktop.move_window(EDITOR, Rect::new(400, 300, 800, 600));

        let held = lock_store(&store);
        let report = thread::scope(|scope| {
            let restorer = scope.spawn(|| restore(&store, &desktop, &[]));
            thread::sleep(Duration::from_millis(20));
            // the monitors come back while another pass holds the store
            desktop.set_monitors(docked_monitors());
            drop(held);
            restorer.join().unwrap()
        });

        assert_eq!(report.restored, 1);
        assert_eq!(desktop.screen_rect(EDITOR).unwrap(), Rect::new(0, 0, 800, 600));
    }

    #[test]
    fn failure_on_one_window_does_not_stop_the_pass() {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(EDITOR, 10, "editor", Rect::new(0, 0, 800, 600));
        desktop.add_window(WindowHandle(2), 20, "browser", Rect::new(800, 0, 800, 600));
        let store = captured(&desktop);

        desktop.move_window(EDITOR, Rect::new(10, 10, 800, 600));
        desktop.move_window(WindowHandle(2), Rect::new(20, 20, 800, 600));
        desktop.fail_window(EDITOR);
        let report = restore(&store, &desktop, &[]);

        assert_eq!(report.failures, 1);
        assert_eq!(report.restored, 1);
        assert_eq!(
            desktop.screen_rect(WindowHandle(2)).unwrap(),
            Rect::new(800, 0, 800, 600)
        );
    }

    #[test]
    fn handle_owned_by_new_process_is_skipped() {
        let desktop = FakeDesktop::with_single_monitor();
        desktop.add_window(EDITOR, 10, "editor", Rect::new(0, 0, 800, 600));
        let store = captured(&desktop);

        desktop.remove_window(EDITOR);
        desktop.add_window(EDITOR, 11, "editor", Rect::new(60, 60, 800, 600));
        let report = restore(&store, &desktop, &[]);

        assert_eq!(report.skipped, 1);
        assert!(desktop.calls().is_empty());
    }
}
