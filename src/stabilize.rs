//! Waits for window geometry to settle before a capture or restore pass.
//!
//! After a display change the OS and the applications keep moving windows
//! around for a while. The detector samples every window's screen rectangle,
//! sleeps one poll interval and samples again until two consecutive samples
//! agree.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::platform::WindowInventory;
use crate::types::Rect;
use crate::types::WindowHandle;

/// How a wait for stable geometry ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stabilization {
    /// Two consecutive samples agreed after `polls` polls.
    Stable { polls: u32 },
    /// Geometry was still changing when the poll budget ran out.
    TimedOut { polls: u32 },
}

impl Stabilization {
    #[must_use]
    pub const fn is_stable(self) -> bool { matches!(self, Self::Stable { .. }) }
}

type Sample = HashMap<WindowHandle, Rect>;

/// Polls a [`WindowInventory`] until window rectangles stop changing.
#[derive(Debug)]
pub struct Stabilizer<'a, I: ?Sized> {
    inventory: &'a I,
    poll:      Duration,
    max_polls: u32,
}

impl<'a, I> Stabilizer<'a, I>
where
    I: WindowInventory + ?Sized,
{
    /// `max_polls` is clamped to at least one poll.
    #[must_use]
    pub fn new(inventory: &'a I, poll: Duration, max_polls: u32) -> Self {
        Self {
            inventory,
            poll,
            max_polls: max_polls.max(1),
        }
    }

    /// Block until geometry is stable or the poll budget is spent, then sleep
    /// `extra_delay`.
    ///
    /// A timeout is logged and otherwise treated like success: the caller
    /// proceeds with whatever geometry is current.
    pub fn wait(&self, extra_delay: Duration) -> Stabilization {
        let outcome = self.poll_until_stable();
        match outcome {
            Stabilization::Stable { polls } => {
                debug!("[Stabilizer::wait] geometry stable after {} polls", polls);
            },
            Stabilization::TimedOut { polls } => {
                warn!(
                    "[Stabilizer::wait] geometry still changing after {} polls, proceeding anyway",
                    polls
                );
            },
        }

        if !extra_delay.is_zero() {
            trace!("[Stabilizer::wait] settling for {:?}", extra_delay);
            thread::sleep(extra_delay);
        }
        outcome
    }

    /// [`wait`](Self::wait), then run `on_stable`.
    pub fn wait_then<T>(&self, extra_delay: Duration, on_stable: impl FnOnce(Stabilization) -> T) -> T {
        let outcome = self.wait(extra_delay);
        on_stable(outcome)
    }

    fn poll_until_stable(&self) -> Stabilization {
        let mut baseline = self.sample();
        for polls in 1..=self.max_polls {
            thread::sleep(self.poll);
            let next = self.sample();
            if let (Some(previous), Some(current)) = (&baseline, &next)
                && samples_agree(previous, current)
            {
                return Stabilization::Stable { polls };
            }
            trace!("[Stabilizer::poll_until_stable] poll {} not settled", polls);
            baseline = next;
        }
        Stabilization::TimedOut {
            polls: self.max_polls,
        }
    }

    /// `None` when the windows cannot be enumerated, which never counts as
    /// stable. Windows whose rectangle cannot be read are left out.
    fn sample(&self) -> Option<Sample> {
        let windows = match self.inventory.windows_of_interest() {
            Ok(windows) => windows,
            Err(err) => {
                warn!("[Stabilizer::sample] enumeration failed: {}", err);
                return None;
            },
        };

        Some(
            windows
                .iter()
                .filter_map(|info| {
                    self.inventory
                        .screen_rect(info.handle)
                        .ok()
                        .map(|rect| (info.handle, rect))
                })
                .collect(),
        )
    }
}

/// Windows present in only one sample do not count as movement.
fn samples_agree(previous: &Sample, current: &Sample) -> bool {
    current.iter().all(|(handle, rect)| {
        previous
            .get(handle)
            .is_none_or(|previous_rect| previous_rect == rect)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakeDesktop;
    use crate::types::WindowHandle;

    const POLL: Duration = Duration::from_millis(1);

    #[test]
    fn still_desktop_is_stable_after_one_poll() {
        let desktop = FakeDesktop::new();
        desktop.add_window(WindowHandle(1), 10, "editor", Rect::new(0, 0, 800, 600));

        let outcome = Stabilizer::new(&desktop, POLL, 5).wait(Duration::ZERO);
        assert_eq!(outcome, Stabilization::Stable { polls: 1 });
    }

    #[test]
    fn converges_once_animation_ends() {
        let desktop = FakeDesktop::new();
        let handle = WindowHandle(1);
        desktop.add_window(handle, 10, "editor", Rect::new(0, 0, 800, 600));
        desktop.animate(
            handle,
            vec![
                Rect::new(10, 0, 800, 600),
                Rect::new(20, 0, 800, 600),
                Rect::new(30, 0, 800, 600),
            ],
        );

        let outcome = Stabilizer::new(&desktop, POLL, 10).wait(Duration::ZERO);
        assert_eq!(outcome, Stabilization::Stable { polls: 3 });
    }

    #[test]
    fn times_out_after_poll_budget() {
        let desktop = FakeDesktop::new();
        let handle = WindowHandle(1);
        desktop.add_window(handle, 10, "editor", Rect::new(0, 0, 800, 600));
        desktop.animate(handle, (1..=20).map(|x| Rect::new(x, 0, 800, 600)).collect());

        let outcome = Stabilizer::new(&desktop, POLL, 4).wait(Duration::ZERO);
        assert_eq!(outcome, Stabilization::TimedOut { polls: 4 });
        assert!(!outcome.is_stable());
    }

    #[test]
    fn appearing_and_vanishing_windows_are_tolerated() {
        let mut before = Sample::new();
        before.insert(WindowHandle(1), Rect::new(0, 0, 10, 10));
        before.insert(WindowHandle(2), Rect::new(5, 5, 10, 10));
        let mut after = Sample::new();
        after.insert(WindowHandle(1), Rect::new(0, 0, 10, 10));
        after.insert(WindowHandle(3), Rect::new(9, 9, 10, 10));

        assert!(samples_agree(&before, &after));
        after.insert(WindowHandle(1), Rect::new(1, 0, 10, 10));
        assert!(!samples_agree(&before, &after));
    }

    #[test]
    fn failing_enumeration_never_counts_as_stable() {
        let desktop = FakeDesktop::new();
        let handle = WindowHandle(1);
        desktop.add_window(handle, 10, "editor", Rect::new(0, 0, 800, 600));
        desktop.animate(handle, (1..=20).map(|x| Rect::new(x, 0, 800, 600)).collect());
        desktop.fail_enumeration(true);

        let outcome = Stabilizer::new(&desktop, POLL, 5).wait_then(Duration::ZERO, |outcome| outcome);
        assert_eq!(outcome, Stabilization::TimedOut { polls: 5 });
    }
}
