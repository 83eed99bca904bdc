//! Capture scheduling: guard flags plus the debounce timer.
//!
//! [`GuardState::transition`] is a pure function from the current flags and a
//! [`Trigger`] to the next flags and a [`Reaction`]. The engine's scheduler
//! thread applies the reaction: it adjusts the [`Debouncer`] and spawns the
//! requested worker.

use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::events::Event;

/// Inputs to the guard state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Os(Event),
    /// The debounce quiet period ran out.
    DebounceElapsed,
    /// The host asked for a capture.
    CaptureRequested,
    /// A restore worker exited.
    RestoreFinished,
}

/// What to do with the debounce timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimerAction {
    #[default]
    Keep,
    /// Cancel any pending deadline and restart the quiet period.
    Rearm,
    Cancel,
}

/// Work to run on a fresh worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Wait for stable geometry, then run one capture pass.
    Capture,
    /// Wait for stable geometry, then restore the current topology's layout.
    Restore,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reaction {
    pub timer: TimerAction,
    pub job:   Option<Job>,
}

impl Reaction {
    const fn timer(timer: TimerAction) -> Self { Self { timer, job: None } }

    const fn spawn(timer: TimerAction, job: Job) -> Self {
        Self {
            timer,
            job: Some(job),
        }
    }
}

/// Flags that decide whether capture and restore may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardState {
    pub session_locked:          bool,
    /// Set while the display configuration is in flux or being restored.
    pub ignore_capture_requests: bool,
    /// Set from the moment a restore is scheduled until its worker exits.
    pub restore_pending:         bool,
}

impl GuardState {
    #[must_use]
    pub const fn capture_allowed(self) -> bool {
        !self.session_locked && !self.ignore_capture_requests && !self.restore_pending
    }

    /// Compute the next state and the side effects for `trigger`.
    #[must_use]
    pub fn transition(self, trigger: Trigger) -> (Self, Reaction) {
        let mut next = self;
        let reaction = match trigger {
            Trigger::Os(Event::WindowMoved) => {
                if self.ignore_capture_requests {
                    trace!("[GuardState::transition] window move ignored");
                    Reaction::default()
                } else {
                    Reaction::timer(TimerAction::Rearm)
                }
            },
            Trigger::DebounceElapsed | Trigger::CaptureRequested => {
                if self.capture_allowed() {
                    Reaction::spawn(TimerAction::Keep, Job::Capture)
                } else {
                    debug!(
                        "[GuardState::transition] {:?} dropped, capture blocked by {:?}",
                        trigger, self
                    );
                    Reaction::default()
                }
            },
            Trigger::Os(Event::DisplaySettingsChanging) => {
                info!("[GuardState::transition] display settings changing");
                next.ignore_capture_requests = true;
                Reaction::timer(TimerAction::Cancel)
            },
            Trigger::Os(Event::DisplaySettingsChanged) => {
                info!("[GuardState::transition] display settings changed");
                next.begin_restore(TimerAction::Keep)
            },
            Trigger::Os(Event::PowerResume) => {
                info!("[GuardState::transition] resumed from suspend");
                next.ignore_capture_requests = true;
                next.begin_restore(TimerAction::Cancel)
            },
            Trigger::Os(Event::PowerSuspend) => {
                info!("[GuardState::transition] system suspending");
                Reaction::default()
            },
            Trigger::Os(Event::SessionLock) => {
                info!("[GuardState::transition] session locked");
                next.session_locked = true;
                Reaction::default()
            },
            Trigger::Os(Event::SessionUnlock) => {
                info!("[GuardState::transition] session unlocked");
                next.session_locked = false;
                Reaction::default()
            },
            Trigger::RestoreFinished => {
                debug!("[GuardState::transition] restore finished, capture re-enabled");
                next.restore_pending = false;
                next.ignore_capture_requests = false;
                Reaction::default()
            },
        };
        (next, reaction)
    }

    fn begin_restore(&mut self, timer: TimerAction) -> Reaction {
        if self.restore_pending {
            debug!("[GuardState::begin_restore] restore already pending");
            return Reaction::timer(timer);
        }
        self.restore_pending = true;
        Reaction::spawn(timer, Job::Restore)
    }
}

/// Single-deadline quiet-period timer.
///
/// Every re-arm pushes the deadline out by the full quiet period, so a burst
/// of events fires once, a quiet period after the last one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet_period: Duration,
    deadline:     Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub const fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) { self.deadline = Some(now + self.quiet_period); }

    pub const fn cancel(&mut self) { self.deadline = None; }

    #[must_use]
    pub const fn is_armed(&self) -> bool { self.deadline.is_some() }

    pub fn apply(&mut self, action: TimerAction, now: Instant) {
        match action {
            TimerAction::Keep => {},
            TimerAction::Rearm => self.arm(now),
            TimerAction::Cancel => self.cancel(),
        }
    }

    /// Disarm and return `true` if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            },
            _ => false,
        }
    }

    /// Time left until the deadline, or `None` when disarmed.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}
