//! In-memory desktop for tests and demos.
//!
//! `FakeDesktop` implements every platform trait over a shared, mutable
//! model of windows and monitors. Clones share the same model, so a test can
//! hand one clone to a [`LayoutKeeper`](crate::LayoutKeeper) and keep
//! scripting the desktop through another.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use tracing::trace;

use super::DisplayTopology;
use super::Notifications;
use super::SetRectFlags;
use super::Subscription;
use super::WindowInventory;
use crate::error::PlatformError;
use crate::events::Event;
use crate::events::EventSink;
use crate::monitors::MonitorInfo;
use crate::monitors::Monitors;
use crate::types::Placement;
use crate::types::ProcessInfo;
use crate::types::Rect;
use crate::types::ShowState;
use crate::types::WindowHandle;
use crate::types::WindowInfo;

/// `ERROR_INVALID_WINDOW_HANDLE`, reported for windows marked as failing.
const INVALID_WINDOW_HANDLE: i32 = 1400;

/// A geometry write recorded by the fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    SetPlacement(WindowHandle, Placement),
    SetWindowRect(WindowHandle, Rect, SetRectFlags),
}

#[derive(Debug)]
struct FakeWindow {
    info:      WindowInfo,
    placement: Placement,
    rect:      Rect,
    /// Rectangles handed out by successive `screen_rect` reads.
    frames:    VecDeque<Rect>,
}

#[derive(Debug, Default)]
struct State {
    windows:          BTreeMap<WindowHandle, FakeWindow>,
    monitors:         Vec<MonitorInfo>,
    calls:            Vec<Call>,
    failing:          HashSet<WindowHandle>,
    fail_enumeration: bool,
    sink:             Option<EventSink>,
}

impl State {
    fn window(&self, handle: WindowHandle, call: &'static str) -> Result<&FakeWindow, PlatformError> {
        if self.failing.contains(&handle) {
            return Err(PlatformError::Os {
                call,
                code: INVALID_WINDOW_HANDLE,
            });
        }
        self.windows
            .get(&handle)
            .ok_or(PlatformError::WindowGone(handle))
    }

    fn window_mut(
        &mut self,
        handle: WindowHandle,
        call: &'static str,
    ) -> Result<&mut FakeWindow, PlatformError> {
        if self.failing.contains(&handle) {
            return Err(PlatformError::Os {
                call,
                code: INVALID_WINDOW_HANDLE,
            });
        }
        self.windows
            .get_mut(&handle)
            .ok_or(PlatformError::WindowGone(handle))
    }

    /// The on-screen rectangle the OS would give a window with `placement`.
    fn rect_for(&self, placement: &Placement, current: Rect) -> Rect {
        match placement.show_state {
            ShowState::Normal => placement.normal_rect,
            ShowState::Maximized => {
                let center = placement.normal_rect.center();
                Monitors::new(self.monitors.clone())
                    .closest_to(center.x, center.y)
                    .map_or(placement.normal_rect, |monitor| monitor.bounds)
            },
            ShowState::Minimized => current,
        }
    }
}

/// Scriptable in-memory implementation of [`Platform`](super::Platform).
#[derive(Debug, Clone, Default)]
pub struct FakeDesktop {
    state: Arc<Mutex<State>>,
}

impl FakeDesktop {
    /// An empty desktop with no monitors.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// An empty desktop with one 1920x1080 primary monitor.
    #[must_use]
    pub fn with_single_monitor() -> Self {
        let desktop = Self::new();
        desktop.set_monitors(vec![MonitorInfo::new(
            r"\\.\DISPLAY1",
            Rect::new(0, 0, 1920, 1080),
            true,
        )]);
        desktop
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add a normal window. The process name doubles as the title.
    pub fn add_window(&self, handle: WindowHandle, process_id: u32, process_name: &str, rect: Rect) {
        let window = FakeWindow {
            info: WindowInfo {
                handle,
                title: process_name.to_string(),
                process: ProcessInfo {
                    id:   process_id,
                    name: process_name.to_string(),
                },
            },
            placement: Placement {
                normal_rect: rect,
                ..Placement::default()
            },
            rect,
            frames: VecDeque::new(),
        };
        self.state().windows.insert(handle, window);
    }

    pub fn remove_window(&self, handle: WindowHandle) { self.state().windows.remove(&handle); }

    /// Move a window the way a user drag would: it ends up normal at `rect`.
    pub fn move_window(&self, handle: WindowHandle, rect: Rect) {
        if let Some(window) = self.state().windows.get_mut(&handle) {
            window.placement.show_state = ShowState::Normal;
            window.placement.normal_rect = rect;
            window.rect = rect;
        }
    }

    /// Place a window at `rect` without changing its normal rectangle, like
    /// an edge snap.
    pub fn snap_window(&self, handle: WindowHandle, rect: Rect) {
        if let Some(window) = self.state().windows.get_mut(&handle) {
            window.placement.show_state = ShowState::Normal;
            window.rect = rect;
        }
    }

    pub fn set_show_state(&self, handle: WindowHandle, show_state: ShowState) {
        let mut state = self.state();
        let Some(window) = state.windows.get(&handle) else {
            return;
        };
        let placement = window.placement.with_show_state(show_state);
        let rect = state.rect_for(&placement, window.rect);
        if let Some(window) = state.windows.get_mut(&handle) {
            window.placement = placement;
            window.rect = rect;
        }
    }

    /// Queue rectangles that successive `screen_rect` reads walk through,
    /// as if the window were still being moved.
    pub fn animate(&self, handle: WindowHandle, frames: Vec<Rect>) {
        if let Some(window) = self.state().windows.get_mut(&handle) {
            window.frames.extend(frames);
        }
    }

    /// Replace the monitors. Normal windows left outside every monitor are
    /// pulled onto the primary one, the way the OS does.
    pub fn set_monitors(&self, monitors: Vec<MonitorInfo>) {
        let mut state = self.state();
        state.monitors = monitors;
        let monitors = Monitors::new(state.monitors.clone());
        let Some(primary) = monitors.primary() else {
            return;
        };

        for window in state.windows.values_mut() {
            let center = window.rect.center();
            let on_screen = monitors.at(center.x, center.y).is_some();
            if on_screen || window.placement.show_state != ShowState::Normal {
                continue;
            }
            let rect = Rect::new(
                primary.bounds.left,
                primary.bounds.top,
                window.rect.width,
                window.rect.height,
            );
            trace!(
                "[FakeDesktop::set_monitors] {} pulled onto {}",
                window.info.handle, primary.device_name
            );
            window.placement.normal_rect = rect;
            window.rect = rect;
        }
    }

    /// Make every read and write on `handle` fail with an OS error.
    pub fn fail_window(&self, handle: WindowHandle) { self.state().failing.insert(handle); }

    pub fn fail_enumeration(&self, fail: bool) { self.state().fail_enumeration = fail; }

    /// Geometry writes made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> { self.state().calls.clone() }

    pub fn clear_calls(&self) { self.state().calls.clear(); }

    #[must_use]
    pub fn is_subscribed(&self) -> bool { self.state().sink.is_some() }

    /// Deliver `event` to the current subscriber. Returns `false` when nobody
    /// is listening.
    pub fn emit(&self, event: Event) -> bool {
        let sink = self.state().sink.clone();
        sink.is_some_and(|sink| sink.post(event))
    }
}

impl WindowInventory for FakeDesktop {
    fn windows_of_interest(&self) -> Result<Vec<WindowInfo>, PlatformError> {
        let state = self.state();
        if state.fail_enumeration {
            return Err(PlatformError::Os {
                call: "EnumWindows",
                code: 5,
            });
        }
        Ok(state.windows.values().map(|w| w.info.clone()).collect())
    }

    fn placement(&self, handle: WindowHandle) -> Result<Placement, PlatformError> {
        Ok(self.state().window(handle, "GetWindowPlacement")?.placement)
    }

    fn screen_rect(&self, handle: WindowHandle) -> Result<Rect, PlatformError> {
        let mut state = self.state();
        let window = state.window_mut(handle, "GetWindowRect")?;
        if let Some(frame) = window.frames.pop_front() {
            window.rect = frame;
            if window.placement.show_state == ShowState::Normal {
                window.placement.normal_rect = frame;
            }
        }
        Ok(window.rect)
    }

    fn set_placement(&self, handle: WindowHandle, placement: &Placement) -> Result<(), PlatformError> {
        let mut state = self.state();
        let current = state.window(handle, "SetWindowPlacement")?.rect;
        let rect = state.rect_for(placement, current);
        let window = state.window_mut(handle, "SetWindowPlacement")?;
        window.placement = *placement;
        window.rect = rect;
        trace!("[FakeDesktop::set_placement] {} -> {:?}", handle, placement);
        state.calls.push(Call::SetPlacement(handle, *placement));
        Ok(())
    }

    fn set_window_rect(
        &self,
        handle: WindowHandle,
        rect: Rect,
        flags: SetRectFlags,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.window_mut(handle, "SetWindowPos")?.rect = rect;
        trace!("[FakeDesktop::set_window_rect] {} -> {}", handle, rect);
        state.calls.push(Call::SetWindowRect(handle, rect, flags));
        Ok(())
    }
}

impl DisplayTopology for FakeDesktop {
    fn monitors(&self) -> Result<Monitors, PlatformError> {
        Ok(Monitors::new(self.state().monitors.clone()))
    }
}

impl Notifications for FakeDesktop {
    fn subscribe(&self, sink: EventSink) -> Result<Subscription, PlatformError> {
        self.state().sink = Some(sink);
        let state = Arc::clone(&self.state);
        Ok(Subscription::new(move || {
            state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .sink = None;
        }))
    }
}
