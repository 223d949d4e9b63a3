//! Fixed-size worker pool with bounded queueing and busy tracking.
//!
//! This module owns the concurrency-critical path between admission and the
//! engine:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     AdmissionGate                           │
//! │          (suspends while quiescence is active)              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ enqueue (bounded FIFO)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkerPool                             │
//! │  - N fixed worker threads, blocking dequeue                 │
//! │  - busy count (RAII guard) + idle notification              │
//! │  - oneshot result slot per task                             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ infer(handles, buffer)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Engine (external)                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - Each task's result slot resolves exactly once, with a result or an
//!   error, and always with the output of that task's own buffer.
//! - `busy()` is true iff at least one worker is between dequeue-accept
//!   and result resolution; the busy count is decremented before the
//!   result slot resolves, so idle observers and resolved futures agree.
//! - A worker that dequeues a task while the block flag is up parks with
//!   the task (busy released) until the flag clears or shutdown; nothing
//!   executes during a device reset and no task is lost.
//! - The queue is bounded; at capacity `enqueue` fails fast instead of
//!   buffering without limit.

use crate::admission::ResourceManager;
use crate::engine::{Engine, EngineError, PixelBuffer, TextRegion};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

/// Default number of worker threads.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default pending-task queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// How long a worker waits on the queue before re-checking liveness.
const DEQUEUE_WAIT: Duration = Duration::from_millis(100);

/// Poll interval while a worker is parked on the block flag.
const BLOCK_PARK_INTERVAL: Duration = Duration::from_millis(10);

type InferOutcome = Result<Vec<TextRegion>, EngineError>;

/// Errors returned when a task cannot be accepted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The pending-task queue is at capacity.
    #[error("Task queue full ({capacity} pending); try again later")]
    QueueFull { capacity: usize },

    /// The pool has shut down and accepts no new work.
    #[error("Worker pool is shut down")]
    ShutDown,
}

/// A task travelling from the gate to a worker.
struct InferTask {
    image: PixelBuffer,
    reply: oneshot::Sender<InferOutcome>,
}

// =============================================================================
// Pending Inference
// =============================================================================

/// Handle to one submitted task's eventual result.
///
/// Resolves exactly once. Dropping it abandons the result; the worker
/// still completes the task and releases its busy slot.
pub struct PendingInference {
    rx: oneshot::Receiver<InferOutcome>,
}

impl PendingInference {
    /// Waits for the result, up to `timeout`.
    ///
    /// A timeout is reported as [`EngineError::Timeout`]. The engine call
    /// keeps running on its worker; only the wait is abandoned.
    pub async fn wait(self, timeout: Duration) -> InferOutcome {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(EngineError::WorkerGone),
            Err(_) => Err(EngineError::Timeout { waited: timeout }),
        }
    }
}

// =============================================================================
// Busy tracking
// =============================================================================

/// Shared busy state: count of executing workers plus idle notification.
struct BusyState {
    count: AtomicUsize,
    peak: AtomicUsize,
    idle: Notify,
}

impl BusyState {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }
}

/// RAII guard for one worker's busy slot.
///
/// Raised after dequeue, released (with idle notification on the last
/// slot) when the task resolves or the worker parks on the block flag.
struct BusyGuard<'a> {
    state: &'a BusyState,
}

impl<'a> BusyGuard<'a> {
    fn raise(state: &'a BusyState) -> Self {
        let current = state.count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut peak = state.peak.load(Ordering::Relaxed);
        while current > peak {
            match state.peak.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
        Self { state }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.state.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.idle.notify_waiters();
        }
    }
}

// =============================================================================
// Worker Pool
// =============================================================================

/// Fixed-size pool of inference worker threads.
pub struct WorkerPool {
    work_tx: Mutex<Option<SyncSender<InferTask>>>,
    busy: Arc<BusyState>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    size: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    /// Starts `size` worker threads over a queue of `queue_capacity` slots.
    ///
    /// Workers snapshot the current pipeline handles from `manager` before
    /// every inference, so a completed quiescence cycle takes effect on the
    /// very next task.
    pub fn new(
        size: usize,
        queue_capacity: usize,
        engine: Arc<dyn Engine>,
        manager: Arc<ResourceManager>,
    ) -> Self {
        assert!(size > 0, "pool size must be > 0");
        assert!(queue_capacity > 0, "queue capacity must be > 0");

        let (work_tx, work_rx) = sync_channel::<InferTask>(queue_capacity);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let busy = Arc::new(BusyState::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        info!(
            workers = size,
            queue_capacity, "Starting inference worker pool"
        );

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let engine = Arc::clone(&engine);
            let work_rx = Arc::clone(&work_rx);
            let busy = Arc::clone(&busy);
            let shutdown = Arc::clone(&shutdown);
            let manager = Arc::clone(&manager);

            let handle = thread::Builder::new()
                .name(format!("ocr-worker-{}", i))
                .spawn(move || {
                    Self::worker_loop(engine, work_rx, busy, shutdown, manager);
                })
                .expect("Failed to spawn inference worker thread");
            workers.push(handle);
        }

        Self {
            work_tx: Mutex::new(Some(work_tx)),
            busy,
            shutdown,
            workers: Mutex::new(workers),
            size,
            queue_capacity,
        }
    }

    /// Worker thread loop: dequeue, honor the block flag, infer, resolve.
    fn worker_loop(
        engine: Arc<dyn Engine>,
        work_rx: Arc<Mutex<Receiver<InferTask>>>,
        busy: Arc<BusyState>,
        shutdown: Arc<AtomicBool>,
        manager: Arc<ResourceManager>,
    ) {
        'tasks: loop {
            let work = {
                let receiver = work_rx.lock().expect("work queue lock poisoned");
                receiver.recv_timeout(DEQUEUE_WAIT)
            };

            let task = match work {
                Ok(task) => task,
                Err(RecvTimeoutError::Timeout) => continue,
                // Sender dropped and queue drained: shutdown complete.
                Err(RecvTimeoutError::Disconnected) => break,
            };

            // Raise busy before reading the flag. The monitor stores the
            // flag before reading busy; with SeqCst on both sides at least
            // one of us observes the other, so a task can never slip into
            // execution after the monitor has seen the pool idle.
            let mut guard = BusyGuard::raise(&busy);
            while manager.is_blocked() {
                drop(guard);
                loop {
                    if shutdown.load(Ordering::SeqCst) {
                        // Shutdown during quiescence: fail the task rather
                        // than deadlock the join.
                        let _ = task.reply.send(Err(EngineError::Unavailable));
                        continue 'tasks;
                    }
                    thread::sleep(BLOCK_PARK_INTERVAL);
                    if !manager.is_blocked() {
                        break;
                    }
                }
                guard = BusyGuard::raise(&busy);
            }

            let handles = manager.handles();
            let result = engine.infer(handles, &task.image);
            if let Err(ref e) = result {
                debug!(error = %e, "Inference failed");
            }

            // Release the busy slot before resolving, so busy() is already
            // false at the moment the caller sees the result.
            drop(guard);
            // Receiver may have timed out and gone away; that is fine.
            let _ = task.reply.send(result);
        }
    }

    /// Appends a task to the queue. Never blocks.
    ///
    /// Fails with [`SubmitError::QueueFull`] at capacity and
    /// [`SubmitError::ShutDown`] once [`shutdown`](Self::shutdown) ran.
    pub fn enqueue(&self, image: PixelBuffer) -> Result<PendingInference, SubmitError> {
        let (reply, rx) = oneshot::channel();
        let tx_guard = self.work_tx.lock().expect("work sender lock poisoned");
        let tx = tx_guard.as_ref().ok_or(SubmitError::ShutDown)?;

        match tx.try_send(InferTask { image, reply }) {
            Ok(()) => Ok(PendingInference { rx }),
            Err(TrySendError::Full(_)) => Err(SubmitError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(SubmitError::ShutDown),
        }
    }

    /// True iff at least one worker is currently executing a task.
    pub fn busy(&self) -> bool {
        self.busy_count() > 0
    }

    /// Number of workers currently executing a task.
    pub fn busy_count(&self) -> usize {
        self.busy.count.load(Ordering::SeqCst)
    }

    /// Peak number of concurrently executing workers observed.
    pub fn peak_busy(&self) -> usize {
        self.busy.peak.load(Ordering::SeqCst)
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Suspends until the busy count reaches zero.
    ///
    /// Woken by the last busy slot's release rather than by polling.
    /// Returns immediately when the pool is already idle.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.busy.idle.notified();
            if self.busy.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting work, drains the queue, and joins all workers.
    ///
    /// Already-queued tasks still resolve; tasks parked on the block flag
    /// resolve with [`EngineError::Unavailable`] so a concurrent quiescence
    /// cycle cannot deadlock the join.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        // Dropping the sender disconnects the queue once drained.
        self.work_tx
            .lock()
            .expect("work sender lock poisoned")
            .take();

        let mut workers = self.workers.lock().expect("workers lock poisoned");
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                warn!("Inference worker thread panicked during shutdown");
            }
        }
        debug!("Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
