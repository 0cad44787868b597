//! Pollable worker lifecycle.
//!
//! A worker runs on its own thread: one-time [`Worker::setup`], then
//! [`Worker::tick`] every `period`, until a stop is requested. The sleep
//! between ticks is sliced into one-second steps so a stop request is
//! observed within about a second regardless of the configured period.
//!
//! ```text
//! Created → Prepared → Running → Stopping → Terminated
//! ```
//!
//! [`WorkerHandle::request_stop`] sets the stop flag and runs the worker's
//! teardown hook synchronously on the caller's thread, so blocking resources
//! (follower subprocesses, pipes) are released before the loop notices.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::SourceError;

/// Granularity at which the loop checks the stop flag while sleeping.
pub const STOP_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Period used when a section does not configure one.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

/// Resource release callable from any thread. Must be idempotent.
pub type TeardownHook = Arc<dyn Fn() + Send + Sync>;

/// A managed unit of periodic work.
pub trait Worker: Send + 'static {
    /// Section name, used for the thread name and in log messages.
    fn name(&self) -> &str;

    /// Interval between ticks.
    fn period(&self) -> Duration;

    /// One-time resource acquisition. A failure is logged and the worker
    /// still runs; implementations retry lazily inside `tick` where they can.
    fn setup(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// One periodic action. Must not panic; errors are logged and treated
    /// as an empty interval.
    fn tick(&mut self);

    /// Hook releasing blocking resources when a stop is requested.
    fn teardown_hook(&self) -> Option<TeardownHook> {
        None
    }
}

/// Lifecycle state of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Prepared = 1,
    Running = 2,
    Stopping = 3,
    Terminated = 4,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Prepared,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Terminated,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Prepared => write!(f, "prepared"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// State shared between a handle and its worker thread.
struct Control {
    stop: AtomicBool,
    state: AtomicU8,
}

impl Control {
    fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            state: AtomicU8::new(WorkerState::Created as u8),
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move `from → to` only if nothing else changed the state meanwhile.
    fn advance(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Supervisor-side handle to a running worker thread.
pub struct WorkerHandle {
    name: String,
    control: Arc<Control>,
    teardown: Option<TeardownHook>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Start `worker` on a dedicated named thread.
    pub fn spawn(worker: Box<dyn Worker>) -> std::io::Result<Self> {
        let name = worker.name().to_string();
        let control = Arc::new(Control::new());
        let teardown = worker.teardown_hook();

        let thread = {
            let control = Arc::clone(&control);
            let teardown = teardown.clone();
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let mut worker = worker;
                    run_loop(worker.as_mut(), &control, teardown.as_ref());
                })?
        };

        Ok(Self {
            name,
            control,
            teardown,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    /// Request cancellation. Runs the teardown hook synchronously and
    /// returns without waiting for the loop to exit.
    pub fn request_stop(&self) {
        let already = self.control.stop.swap(true, Ordering::SeqCst);
        let _ = self
            .control
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                (s < WorkerState::Stopping as u8).then_some(WorkerState::Stopping as u8)
            });
        if !already {
            log::info!("[{}] stopping...", self.name);
        }
        if let Some(hook) = &self.teardown {
            hook();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the worker thread to exit.
    pub fn join(mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.join().is_err() {
            log::error!("[{}] worker thread panicked", self.name);
        }
    }
}

/// Drive `worker` until `control.stop` is set.
fn run_loop(worker: &mut dyn Worker, control: &Control, teardown: Option<&TeardownHook>) {
    let name = worker.name().to_string();

    if !control.stop_requested() {
        if let Err(e) = worker.setup() {
            log::error!("[{name}] setup failed: {e}");
        }
    }
    control.advance(WorkerState::Created, WorkerState::Prepared);

    let period = worker.period().max(STOP_CHECK_INTERVAL);
    let steps = (period.as_secs_f64() / STOP_CHECK_INTERVAL.as_secs_f64()).ceil() as u64;
    if control.advance(WorkerState::Prepared, WorkerState::Running) {
        log::info!("[{name}] running every {}s", period.as_secs());
    }

    while !control.stop_requested() {
        log::debug!("[{name}] tick");
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| worker.tick()));
        if outcome.is_err() {
            log::error!("[{name}] tick panicked, skipping interval");
        }

        for _ in 0..steps {
            if control.stop_requested() {
                break;
            }
            std::thread::sleep(STOP_CHECK_INTERVAL);
        }
    }

    if let Some(hook) = teardown {
        hook();
    }
    control.state.store(WorkerState::Terminated as u8, Ordering::SeqCst);
    log::info!("[{name}] exiting...");
}
