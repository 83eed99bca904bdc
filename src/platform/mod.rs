//! Capability traits for the OS collaborators the keeper drives.
//!
//! The engine never talks to the OS directly. It reads and writes window
//! geometry through [`WindowInventory`], identifies the monitor arrangement
//! through [`DisplayTopology`], and receives notifications through
//! [`Notifications`]. [`win32::Win32Desktop`] is the production backend;
//! [`fake::FakeDesktop`] keeps everything in memory.

pub mod fake;
#[cfg(windows)]
pub mod win32;

use bitflags::bitflags;
use tracing::debug;

use crate::error::PlatformError;
use crate::events::EventSink;
use crate::monitors::Monitors;
use crate::monitors::TopologyKey;
use crate::types::Placement;
use crate::types::Rect;
use crate::types::WindowHandle;
use crate::types::WindowInfo;

bitflags! {
    /// Options for a direct window move/resize.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SetRectFlags: u32 {
        /// Keep the window's position in the z-order.
        const NO_Z_ORDER = 1;
        /// Post the request to the window's thread instead of waiting for it.
        const ASYNC      = 1 << 1;
    }
}

/// Enumeration and single-window geometry I/O.
pub trait WindowInventory: Send + Sync {
    /// Visible, top-level, non-cloaked windows with a non-empty title.
    ///
    /// # Errors
    ///
    /// Returns an error if the window list cannot be enumerated.
    fn windows_of_interest(&self) -> Result<Vec<WindowInfo>, PlatformError>;

    /// # Errors
    ///
    /// Returns an error if the placement of `handle` cannot be read.
    fn placement(&self, handle: WindowHandle) -> Result<Placement, PlatformError>;

    /// Effective on-screen rectangle, including snapped and maximized geometry.
    ///
    /// # Errors
    ///
    /// Returns an error if the rectangle of `handle` cannot be read.
    fn screen_rect(&self, handle: WindowHandle) -> Result<Rect, PlatformError>;

    /// # Errors
    ///
    /// Returns an error if the OS rejects the placement.
    fn set_placement(&self, handle: WindowHandle, placement: &Placement) -> Result<(), PlatformError>;

    /// # Errors
    ///
    /// Returns an error if the OS rejects the move/resize.
    fn set_window_rect(
        &self,
        handle: WindowHandle,
        rect: Rect,
        flags: SetRectFlags,
    ) -> Result<(), PlatformError>;
}

/// Current monitor arrangement.
pub trait DisplayTopology: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the monitors cannot be enumerated.
    fn monitors(&self) -> Result<Monitors, PlatformError>;

    /// # Errors
    ///
    /// Returns an error if the monitors cannot be enumerated.
    fn topology_key(&self) -> Result<TopologyKey, PlatformError> {
        let key = self.monitors()?.topology_key();
        debug!("[topology_key] current topology is '{}'", key);
        Ok(key)
    }
}

/// Registration for window-move, display, power and session notifications.
pub trait Notifications: Send + Sync {
    /// Start delivering events to `sink` until the returned subscription is
    /// released.
    ///
    /// # Errors
    ///
    /// Returns an error if any notification source cannot be registered.
    fn subscribe(&self, sink: EventSink) -> Result<Subscription, PlatformError>;
}

/// A complete backend.
pub trait Platform: WindowInventory + DisplayTopology + Notifications + 'static {}

impl<T> Platform for T where T: WindowInventory + DisplayTopology + Notifications + 'static {}

/// Scoped notification registration.
///
/// The release action runs exactly once, either through [`release`](Self::release)
/// or on drop.
#[must_use = "dropping a subscription unregisters it"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unregister. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    #[must_use]
    pub const fn is_released(&self) -> bool { self.release.is_none() }
}

impl Drop for Subscription {
    fn drop(&mut self) { self.release(); }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.is_released())
            .finish()
    }
}
