//! Background thread pool for asset probes.
//!
//! Uses work-stealing deques:
//! - Jobs go through a global injector
//! - Idle workers steal from each other
//!
//! Probes can block on the network for a long time, so they never run on
//! the coordination thread. A job must not touch coordinator state; it posts
//! its result into the coordinator inbox instead.

use crossbeam::deque::{Injector, Worker};
use log::{trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How long `Drop` waits for workers before leaving them to the process
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Probe worker pool.
///
/// # Example
/// ```ignore
/// let workers = ProbeWorkers::new(2);
/// workers.execute(move || {
///     let result = backend.probe(&url);
///     events.send(MediaEvent::ProbeFinished { url: key, result });
/// });
/// ```
pub struct ProbeWorkers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for ProbeWorkers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeWorkers")
            .field("threads", &self.handles.len())
            .finish()
    }
}

impl ProbeWorkers {
    /// Spawn `num_threads` workers (at least one)
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers_local: Vec<Worker<Job>> = Vec::new();
        let mut stealers = Vec::new();
        let mut handles = Vec::new();

        for _ in 0..num_threads {
            let worker: Worker<Job> = Worker::new_fifo();
            stealers.push(worker.stealer());
            workers_local.push(worker);
        }

        for (worker_id, worker) in workers_local.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let spawned = thread::Builder::new()
                .name(format!("feedplay-probe-{}", worker_id))
                .spawn(move || {
                    trace!("Probe worker {} started", worker_id);

                    loop {
                        if let Some(job) = worker.pop() {
                            job();
                            continue;
                        }

                        // Batch-steal from the injector into our own deque
                        if let Some(job) = injector.steal_batch_and_pop(&worker).success() {
                            job();
                            continue;
                        }

                        if let Some(job) = stealers.iter().find_map(|s| s.steal().success()) {
                            job();
                            continue;
                        }

                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }

                        thread::sleep(Duration::from_millis(1));
                    }

                    trace!("Probe worker {} stopped", worker_id);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Failed to spawn probe worker {}: {}", worker_id, e),
            }
        }

        trace!("ProbeWorkers initialized: {} threads", handles.len());

        Self {
            injector,
            handles,
            shutdown,
        }
    }

    /// Run `f` on a worker thread.
    ///
    /// Falls back to running inline when no worker thread could be spawned.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.handles.is_empty() {
            f();
            return;
        }
        self.injector.push(Box::new(f));
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for ProbeWorkers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("ProbeWorkers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // A probe may be stuck on the network; don't hold the caller hostage
        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, leaving probe workers running");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} probe workers stopped", num_threads);
    }
}
