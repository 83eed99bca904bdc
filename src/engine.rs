//! Scheduler thread and capture/restore workers.

use std::any::Any;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::capture::CaptureMode;
use crate::capture::capture_pass;
use crate::config::KeeperConfig;
use crate::error::KeeperError;
use crate::events::EventSink;
use crate::events::Message;
use crate::platform::Platform;
use crate::restore::restore_pass;
use crate::scheduler::Debouncer;
use crate::scheduler::GuardState;
use crate::scheduler::Job;
use crate::scheduler::Trigger;
use crate::snapshot::SnapshotStore;
use crate::stabilize::Stabilizer;

const SCHEDULER_THREAD: &str = "layout-keeper-scheduler";
const CAPTURE_THREAD: &str = "layout-keeper-capture";
const RESTORE_THREAD: &str = "layout-keeper-restore";

/// State shared by the facade, the scheduler and every worker.
pub(crate) struct Shared<P> {
    pub platform: P,
    pub store:    Mutex<SnapshotStore>,
    pub config:   KeeperConfig,
    /// Copy of the scheduler's flags, updated after every transition.
    pub guard:    Mutex<GuardState>,
}

impl<P> Shared<P> {
    pub fn new(platform: P, config: KeeperConfig) -> Self {
        Self {
            platform,
            store: Mutex::new(SnapshotStore::new()),
            config,
            guard: Mutex::new(GuardState::default()),
        }
    }

    pub fn guard_state(&self) -> GuardState {
        *self
            .guard
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn publish(&self, state: GuardState) {
        *self
            .guard
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = state;
    }
}

impl<P: Platform> Shared<P> {
    fn stabilizer(&self) -> Stabilizer<'_, P> {
        Stabilizer::new(
            &self.platform,
            self.config.stabilization_poll(),
            self.config.max_stabilization_polls,
        )
    }
}

/// Posts [`Message::RestoreFinished`] when dropped, so the guard flags are
/// released however the restore worker ends. If the worker thread cannot be
/// spawned the closure owning the latch is dropped and the message is still
/// posted.
struct RestoreLatch {
    sink: EventSink,
}

impl Drop for RestoreLatch {
    fn drop(&mut self) {
        if !self.sink.send(Message::RestoreFinished) {
            debug!("[RestoreLatch::drop] scheduler already stopped");
        }
    }
}

/// Start the scheduler thread draining `rx`.
pub(crate) fn spawn_scheduler<P: Platform>(
    shared: Arc<Shared<P>>,
    rx: Receiver<Message>,
    sink: EventSink,
) -> Result<JoinHandle<()>, KeeperError> {
    thread::Builder::new()
        .name(SCHEDULER_THREAD.to_string())
        .spawn(move || run_scheduler(&shared, &rx, &sink))
        .map_err(|source| KeeperError::Spawn {
            name: SCHEDULER_THREAD,
            source,
        })
}

fn run_scheduler<P: Platform>(shared: &Arc<Shared<P>>, rx: &Receiver<Message>, sink: &EventSink) {
    debug!("[run_scheduler] started");
    let mut guard = GuardState::default();
    let mut debouncer = Debouncer::new(shared.config.debounce());

    loop {
        let now = Instant::now();
        if debouncer.fire_if_due(now) {
            guard = step(shared, sink, &mut debouncer, guard, Trigger::DebounceElapsed);
        }

        let message = match debouncer.remaining(Instant::now()) {
            Some(wait) => match rx.recv_timeout(wait) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        let trigger = match message {
            Message::Os(event) => Trigger::Os(event),
            Message::CaptureRequested => Trigger::CaptureRequested,
            Message::RestoreFinished => Trigger::RestoreFinished,
            Message::Shutdown => break,
        };
        guard = step(shared, sink, &mut debouncer, guard, trigger);
    }
    shared.publish(GuardState::default());
    debug!("[run_scheduler] stopped");
}

/// Apply one transition and carry out its reaction.
fn step<P: Platform>(
    shared: &Arc<Shared<P>>,
    sink: &EventSink,
    debouncer: &mut Debouncer,
    guard: GuardState,
    trigger: Trigger,
) -> GuardState {
    let (next, reaction) = guard.transition(trigger);
    shared.publish(next);
    debouncer.apply(reaction.timer, Instant::now());
    if let Some(job) = reaction.job {
        spawn_job(shared, sink, job);
    }
    next
}

fn spawn_job<P: Platform>(shared: &Arc<Shared<P>>, sink: &EventSink, job: Job) {
    let shared = Arc::clone(shared);
    let spawned = match job {
        Job::Capture => thread::Builder::new()
            .name(CAPTURE_THREAD.to_string())
            .spawn(move || run_guarded("capture_worker", || capture_worker(&shared))),
        Job::Restore => {
            let latch = RestoreLatch { sink: sink.clone() };
            thread::Builder::new()
                .name(RESTORE_THREAD.to_string())
                .spawn(move || {
                    let _latch = latch;
                    run_guarded("restore_worker", || restore_worker(&shared));
                })
        },
    };

    if let Err(err) = spawned {
        error!("[spawn_job] failed to spawn {:?} worker: {}", job, err);
    }
}

/// Run `work`, logging instead of unwinding past the worker boundary.
fn run_guarded(name: &str, work: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        error!("[{}] worker panicked: {}", name, panic_message(payload.as_ref()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message;
    }
    payload
        .downcast_ref::<String>()
        .map_or("unknown panic payload", String::as_str)
}

fn capture_worker<P: Platform>(shared: &Shared<P>) {
    shared.stabilizer().wait(Duration::ZERO);
    match capture_pass(
        &shared.store,
        &shared.platform,
        &shared.platform,
        CaptureMode::Incremental,
    ) {
        Ok(report) => debug!("[capture_worker] {}", report),
        Err(err) => warn!("[capture_worker] capture failed: {}", err),
    }
}

fn restore_worker<P: Platform>(shared: &Shared<P>) {
    info!("[restore_worker] waiting for windows to settle");
    shared.stabilizer().wait(shared.config.restore_settle());

    if let Err(err) = restore_pass(
        &shared.store,
        &shared.platform,
        &shared.platform,
        &shared.config.hang_denylist,
    ) {
        error!("[restore_worker] restore failed: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn latch_posts_restore_finished_on_drop() {
        let (tx, rx) = mpsc::channel();
        drop(RestoreLatch {
            sink: EventSink::new(tx),
        });
        assert_eq!(rx.recv().unwrap(), Message::RestoreFinished);
    }

    #[test]
    fn latch_fires_even_when_work_panics() {
        let (tx, rx) = mpsc::channel();
        let latch = RestoreLatch {
            sink: EventSink::new(tx),
        };
        thread::spawn(move || {
            let _latch = latch;
            run_guarded("test_worker", || panic!("boom"));
        })
        .join()
        .unwrap();
        assert_eq!(rx.recv().unwrap(), Message::RestoreFinished);
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let text: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(text.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
