//! The message-passing boundary between OS notifications and the scheduler.
//!
//! Platform callbacks run on threads the keeper does not own and must return
//! quickly, so they only post an [`Event`] through an [`EventSink`]. The
//! scheduler drains the queue on its own thread.

use std::sync::mpsc::Sender;

use tracing::trace;

/// Notifications that drive the capture scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// A window was moved, resized, brought to the foreground, or a mouse
    /// capture ended.
    WindowMoved,
    /// The display configuration is about to change.
    DisplaySettingsChanging,
    /// The display configuration changed.
    DisplaySettingsChanged,
    PowerSuspend,
    PowerResume,
    SessionLock,
    SessionUnlock,
}

/// Everything the scheduler thread consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Message {
    Os(Event),
    /// Manual capture request from the host.
    CaptureRequested,
    /// A restore worker exited, successfully or not.
    RestoreFinished,
    Shutdown,
}

/// Cloneable, non-blocking handle for posting events to a running keeper.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<Message>,
}

impl EventSink {
    pub(crate) const fn new(tx: Sender<Message>) -> Self { Self { tx } }

    /// Post an event. Returns `false` once the keeper has stopped.
    pub fn post(&self, event: Event) -> bool {
        trace!("[EventSink::post] {:?}", event);
        self.tx.send(Message::Os(event)).is_ok()
    }

    pub(crate) fn send(&self, message: Message) -> bool { self.tx.send(message).is_ok() }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn post_wraps_event_and_reports_disconnect() {
        let (tx, rx) = mpsc::channel();
        let sink = EventSink::new(tx);

        assert!(sink.post(Event::SessionLock));
        assert_eq!(rx.recv().unwrap(), Message::Os(Event::SessionLock));

        drop(rx);
        assert!(!sink.post(Event::SessionUnlock));
    }
}
