//! Process supervisor: owns every live worker handle.
//!
//! The signal path never touches the registry directly; it asks the
//! supervisor to [`stop_all`](Supervisor::stop_all), then the main thread
//! [`join_all`](Supervisor::join_all)s.

use std::sync::Mutex;

use crate::worker::{Worker, WorkerHandle};

/// Synchronized registry of running workers.
#[derive(Default)]
pub struct Supervisor {
    workers: Mutex<Vec<WorkerHandle>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a worker thread and track it.
    pub fn spawn(&self, worker: Box<dyn Worker>) -> std::io::Result<()> {
        let handle = WorkerHandle::spawn(worker)?;
        log::debug!("started worker {}", handle.name());
        self.lock().push(handle);
        Ok(())
    }

    /// Request every tracked worker to stop, most recently started first.
    /// Returns the number of workers signalled.
    pub fn stop_all(&self) -> usize {
        let workers = self.lock();
        for handle in workers.iter().rev() {
            handle.request_stop();
        }
        workers.len()
    }

    /// Block until every tracked worker thread has exited. The registry is
    /// empty afterwards.
    pub fn join_all(&self) -> usize {
        let mut joined = 0;
        loop {
            // Pop under the lock, join outside it.
            let next = self.lock().pop();
            let Some(handle) = next else {
                break;
            };
            handle.join();
            joined += 1;
        }
        joined
    }

    /// Number of tracked workers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the tracked workers, in start order.
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|h| h.name().to_string()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<WorkerHandle>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
