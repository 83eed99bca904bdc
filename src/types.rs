//! Type definitions for window capture and restoration.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Opaque, process-wide-unique window identifier.
///
/// On Windows this is the `HWND` value. Handles are only stable while the
/// window exists; the OS may hand a dead window's handle to a new window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub isize);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:08X}", self.0) }
}

/// A point in virtual-screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self { Self { x, y } }
}

/// A rectangle in virtual-screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left:   i32,
    pub top:    i32,
    pub width:  i32,
    pub height: i32,
}

impl Rect {
    #[must_use]
    pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Build a rectangle from its four edges (the Win32 `RECT` layout).
    #[must_use]
    pub const fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    #[must_use]
    pub const fn right(&self) -> i32 { self.left + self.width }

    #[must_use]
    pub const fn bottom(&self) -> i32 { self.top + self.height }

    #[must_use]
    pub const fn center(&self) -> Point {
        Point::new(self.left + self.width / 2, self.top + self.height / 2)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}x{}]-[{}x{}]",
            self.left, self.top, self.width, self.height
        )
    }
}

/// Show-state of a window as reported by its placement record.
///
/// Snapped windows have no distinct show-state: they report `Normal` with a
/// screen rectangle that differs from the placement's normal rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
}

impl ShowState {
    /// `true` for the states that own the window's on-screen rectangle.
    ///
    /// Any other state may be a snapped window, which needs its actual
    /// rectangle restored in addition to its placement.
    #[must_use]
    pub const fn is_min_or_max(self) -> bool { matches!(self, Self::Minimized | Self::Maximized) }
}

/// A window's show-state plus the geometry it returns to when restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub show_state:   ShowState,
    /// Geometry of the unsnapped, unmaximized window.
    pub normal_rect:  Rect,
    pub min_position: Point,
    pub max_position: Point,
    /// Platform placement flags, carried through untouched.
    pub flags:        u32,
}

impl Placement {
    /// Compare the parts of a placement that matter for change detection.
    #[must_use]
    pub fn same_normal_state(&self, other: &Self) -> bool {
        self.normal_rect == other.normal_rect && self.show_state == other.show_state
    }

    #[must_use]
    pub const fn with_show_state(mut self, show_state: ShowState) -> Self {
        self.show_state = show_state;
        self
    }
}

/// Owning process of a window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub id:   u32,
    pub name: String,
}

/// A window reported by the inventory provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle:  WindowHandle,
    pub title:   String,
    pub process: ProcessInfo,
}

/// Stable identifier of a tracked window: handle plus process name.
///
/// The process id is deliberately not part of the key; it is only used to
/// detect a handle that now belongs to a different process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowKey {
    pub handle:       WindowHandle,
    pub process_name: String,
}

impl WindowKey {
    #[must_use]
    pub fn new(handle: WindowHandle, process_name: impl Into<String>) -> Self {
        Self {
            handle,
            process_name: process_name.into(),
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.handle, self.process_name)
    }
}

/// Captured geometry of one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub handle:       WindowHandle,
    pub process_id:   u32,
    pub process_name: String,
    /// Effective on-screen rectangle, which differs from
    /// `placement.normal_rect` for snapped and maximized windows.
    pub screen_rect:  Rect,
    pub placement:    Placement,
}

impl WindowRecord {
    #[must_use]
    pub fn key(&self) -> WindowKey { WindowKey::new(self.handle, self.process_name.clone()) }
}

impl fmt::Display for WindowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.process_id, self.handle, self.process_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_from_edges_matches_width_and_height() {
        let rect = Rect::from_edges(-1920, 10, 0, 1090);
        assert_eq!(rect, Rect::new(-1920, 10, 1920, 1080));
        assert_eq!(rect.right(), 0);
        assert_eq!(rect.bottom(), 1090);
        assert_eq!(rect.center(), Point::new(-960, 550));
    }

    #[test]
    fn window_key_renders_padded_hex_handle() {
        let key = WindowKey::new(WindowHandle(0x1a2b), "notepad");
        assert_eq!(key.to_string(), "00001A2B-notepad");
    }

    #[test]
    fn placement_comparison_ignores_icon_positions() {
        let base = Placement {
            show_state: ShowState::Normal,
            normal_rect: Rect::new(0, 0, 800, 600),
            ..Placement::default()
        };
        let moved_icon = Placement {
            min_position: Point::new(-32000, -32000),
            ..base
        };
        assert!(base.same_normal_state(&moved_icon));
        assert!(!base.same_normal_state(&base.with_show_state(ShowState::Maximized)));
    }

    #[test]
    fn only_min_and_max_own_the_screen_rect() {
        assert!(ShowState::Minimized.is_min_or_max());
        assert!(ShowState::Maximized.is_min_or_max());
        assert!(!ShowState::Normal.is_min_or_max());
    }
}
