//! Window layout capture and restoration across display topology changes.
//!
//! The keeper remembers where every top-level window sits for each monitor
//! arrangement it has seen, and puts the windows back when that arrangement
//! returns.
//!
//! # The Problem
//!
//! When a monitor is attached or detached, its resolution changes, or the
//! machine resumes from sleep, the OS shuffles windows onto whatever displays
//! remain. Plugging the monitor back in does not move them back.
//!
//! 1. **Geometry keeps moving after the event**: the OS and applications
//!    reposition windows for a while after a display change, so reading
//!    geometry right away captures a half-finished layout.
//!
//! 2. **Placement alone is not enough**: a maximized window remembers a
//!    normal rectangle to return to, and a snapped window reports a normal
//!    show-state with a rectangle that is not its normal rectangle.
//!
//! 3. **Handles are reused**: a dead window's handle can be given to a window
//!    of another process.
//!
//! # The Solution
//!
//! Window-move notifications are debounced and each capture waits for
//! geometry to stop changing. Layouts are stored per topology key, derived
//! from the sorted monitor list. Display changes suppress capture and trigger
//! a restore that replays each saved placement through the normal state
//! before applying its final show-state and rectangle.
//!
//! # Usage
//!
//! ```no_run
//! use window_layout_keeper::KeeperConfig;
//! use window_layout_keeper::LayoutKeeper;
//! use window_layout_keeper::platform::fake::FakeDesktop;
//!
//! let mut keeper = LayoutKeeper::new(FakeDesktop::with_single_monitor(), KeeperConfig::default());
//! keeper.start()?;
//! // ... windows move, displays change ...
//! keeper.stop();
//! # Ok::<(), window_layout_keeper::KeeperError>(())
//! ```
//!
//! On Windows, use [`platform::win32::Win32Desktop`] as the platform.

mod capture;
mod config;
mod detect;
mod engine;
mod error;
mod events;
mod monitors;
pub mod platform;
mod restore;
pub mod scheduler;
mod snapshot;
mod stabilize;
mod types;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;

pub use capture::CaptureMode;
pub use capture::CaptureReport;
pub use capture::capture_pass;
pub use capture::read_window;
pub use config::KeeperConfig;
pub use config::default_config_path;
pub use config::load_config;
pub use config::save_config;
pub use detect::Change;
pub use detect::classify;
pub use detect::detect;
use engine::Shared;
pub use error::ConfigError;
pub use error::KeeperError;
pub use error::PlatformError;
pub use events::Event;
pub use events::EventSink;
use events::Message;
pub use monitors::MonitorInfo;
pub use monitors::Monitors;
pub use monitors::TopologyKey;
use platform::Platform;
use platform::Subscription;
pub use restore::RestoreReport;
pub use restore::restore_pass;
pub use scheduler::GuardState;
pub use snapshot::LayoutSnapshot;
pub use snapshot::SnapshotStore;
use snapshot::lock_store;
pub use stabilize::Stabilization;
pub use stabilize::Stabilizer;
use tracing::debug;
use tracing::error;
use tracing::info;
pub use types::Placement;
pub use types::Point;
pub use types::ProcessInfo;
pub use types::Rect;
pub use types::ShowState;
pub use types::WindowHandle;
pub use types::WindowInfo;
pub use types::WindowKey;
pub use types::WindowRecord;

/// Resources held while the keeper runs.
struct Running {
    sink:         EventSink,
    subscription: Subscription,
    scheduler:    JoinHandle<()>,
}

/// Captures and restores window layouts on a [`Platform`].
///
/// Nothing happens until [`start`](Self::start). Dropping a running keeper
/// stops it.
pub struct LayoutKeeper<P: Platform> {
    shared:  Arc<Shared<P>>,
    running: Option<Running>,
}

impl<P: Platform> LayoutKeeper<P> {
    #[must_use]
    pub fn new(platform: P, config: KeeperConfig) -> Self {
        Self {
            shared:  Arc::new(Shared::new(platform, config)),
            running: None,
        }
    }

    /// Capture the current layout, then start listening for notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the keeper is already running, the initial capture
    /// cannot read the desktop, the scheduler thread cannot be spawned, or the
    /// platform refuses the notification registration.
    pub fn start(&mut self) -> Result<(), KeeperError> {
        if self.running.is_some() {
            return Err(KeeperError::AlreadyRunning);
        }

        let report = capture_pass(
            &self.shared.store,
            &self.shared.platform,
            &self.shared.platform,
            CaptureMode::Initial,
        )?;
        info!("[LayoutKeeper::start] initial capture: {}", report);

        let (tx, rx) = mpsc::channel();
        let sink = EventSink::new(tx);
        let scheduler = engine::spawn_scheduler(Arc::clone(&self.shared), rx, sink.clone())?;

        let subscription = match self.shared.platform.subscribe(sink.clone()) {
            Ok(subscription) => subscription,
            Err(err) => {
                sink.send(Message::Shutdown);
                if scheduler.join().is_err() {
                    error!("[LayoutKeeper::start] scheduler thread panicked");
                }
                return Err(err.into());
            },
        };

        self.running = Some(Running {
            sink,
            subscription,
            scheduler,
        });
        info!("[LayoutKeeper::start] layout keeper running");
        Ok(())
    }

    /// Unregister notifications and stop the scheduler.
    ///
    /// Passes already in flight run to completion. Does nothing when the
    /// keeper is not running.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        running.subscription.release();
        running.sink.send(Message::Shutdown);
        if running.scheduler.join().is_err() {
            error!("[LayoutKeeper::stop] scheduler thread panicked");
        }
        info!("[LayoutKeeper::stop] layout keeper stopped");
    }

    #[must_use]
    pub const fn is_running(&self) -> bool { self.running.is_some() }

    /// Discard every captured layout and capture the current one.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::NotRunning`] if the keeper is stopped.
    pub fn force_capture_layout(&self) -> Result<(), KeeperError> {
        let running = self.running.as_ref().ok_or(KeeperError::NotRunning)?;
        lock_store(&self.shared.store).clear_all();
        Self::request_capture(running)
    }

    /// Request a capture pass without waiting for the debounce period.
    ///
    /// The request is dropped if capture is currently suppressed.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::NotRunning`] if the keeper is stopped.
    pub fn capture_layout_now(&self) -> Result<(), KeeperError> {
        let running = self.running.as_ref().ok_or(KeeperError::NotRunning)?;
        Self::request_capture(running)
    }

    fn request_capture(running: &Running) -> Result<(), KeeperError> {
        debug!("[LayoutKeeper::request_capture] capture requested");
        if running.sink.send(Message::CaptureRequested) {
            Ok(())
        } else {
            Err(KeeperError::NotRunning)
        }
    }

    /// Handle for posting events from host code, while running.
    #[must_use]
    pub fn event_sink(&self) -> Option<EventSink> {
        self.running.as_ref().map(|running| running.sink.clone())
    }

    #[must_use]
    pub fn platform(&self) -> &P { &self.shared.platform }

    #[must_use]
    pub fn config(&self) -> &KeeperConfig { &self.shared.config }

    /// The scheduler's guard flags as of its last transition.
    #[must_use]
    pub fn guard_state(&self) -> GuardState { self.shared.guard_state() }

    /// Topologies with a captured layout.
    #[must_use]
    pub fn topologies(&self) -> Vec<TopologyKey> {
        lock_store(&self.shared.store).topologies().cloned().collect()
    }

    /// A copy of the layout captured for `key`.
    #[must_use]
    pub fn snapshot(&self, key: &TopologyKey) -> Option<LayoutSnapshot> {
        lock_store(&self.shared.store).get(key).cloned()
    }

    /// # Errors
    ///
    /// Returns an error if the monitors cannot be enumerated.
    pub fn current_topology(&self) -> Result<TopologyKey, PlatformError> {
        self.shared.platform.topology_key()
    }

    /// Render every captured layout as RON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn dump(&self) -> Result<String, ron::Error> {
        let store = lock_store(&self.shared.store);
        ron::ser::to_string_pretty(&*store, ron::ser::PrettyConfig::default())
    }
}

impl<P: Platform> Drop for LayoutKeeper<P> {
    fn drop(&mut self) { self.stop(); }
}

impl<P: Platform> std::fmt::Debug for LayoutKeeper<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutKeeper")
            .field("running", &self.is_running())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
