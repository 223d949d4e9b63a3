//! Admission control and engine-state ownership.
//!
//! During normal operation requests flow straight through the gate into the
//! worker pool. When the memory monitor starts a quiescence cycle it raises
//! the block flag here; new submissions then suspend (no spinning, no drops)
//! until the cycle completes and the flag clears.
//!
//! [`ResourceManager`] is the single owner of the two pieces of process-wide
//! shared state: the block flag and the current [`EngineHandles`]. Handles
//! are replaced only inside the quiescence critical section, after the
//! monitor has observed the pool idle.

use crate::engine::{EngineHandles, PixelBuffer};
use crate::pool::{PendingInference, SubmitError, WorkerPool};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Notify;

// =============================================================================
// Resource Manager
// =============================================================================

/// Owner of the block flag and the current pipeline handles.
///
/// Mutators are deliberately narrow: only the monitor's quiescence cycle
/// calls `begin_quiescence` / `complete_quiescence` / `fail_quiescence`,
/// and only one cycle runs at a time (single monitor task).
///
/// The flag uses `SeqCst` on both store and load. Paired with the pool's
/// `SeqCst` busy counter this gives the store-flag-then-read-busy /
/// raise-busy-then-read-flag protocol a total order: the monitor can never
/// observe the pool idle while a worker that missed the flag goes on to
/// execute.
pub struct ResourceManager {
    blocked: AtomicBool,
    unblock: Notify,
    handles: RwLock<EngineHandles>,
    failed_cycles: AtomicU64,
}

impl ResourceManager {
    /// Creates a manager with admission open and the given initial handles.
    pub fn new(initial: EngineHandles) -> Self {
        Self {
            blocked: AtomicBool::new(false),
            unblock: Notify::new(),
            handles: RwLock::new(initial),
            failed_cycles: AtomicU64::new(0),
        }
    }

    /// Returns true while a quiescence cycle holds admission closed.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Snapshot of the current pipeline handles.
    pub fn handles(&self) -> EngineHandles {
        *self.handles.read().expect("handles lock poisoned")
    }

    /// Closes admission at the start of a quiescence cycle.
    pub fn begin_quiescence(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    /// Installs fresh handles and reopens admission.
    ///
    /// Must only be called after the pool has been observed idle, so no
    /// worker can still hold a pre-reset handle snapshot.
    pub fn complete_quiescence(&self, new_handles: EngineHandles) {
        {
            let mut handles = self.handles.write().expect("handles lock poisoned");
            *handles = new_handles;
        }
        self.blocked.store(false, Ordering::SeqCst);
        self.unblock.notify_waiters();
    }

    /// Records a failed reset/reinit attempt. Admission stays closed.
    pub fn fail_quiescence(&self) {
        self.failed_cycles.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of quiescence cycles that failed to reset the device.
    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles.load(Ordering::SeqCst)
    }

    /// Suspends until admission is open.
    ///
    /// Registers for notification before re-checking the flag, so a clear
    /// that races with the check cannot be missed.
    pub async fn wait_admitted(&self) {
        loop {
            let notified = self.unblock.notified();
            if !self.is_blocked() {
                return;
            }
            notified.await;
        }
    }
}

// =============================================================================
// Admission Gate
// =============================================================================

/// Entry point used by the request layer to hand work to the pool.
///
/// `submit` suspends the caller while a quiescence cycle is in progress,
/// then enqueues. Submission order relative to flag transitions is
/// best-effort; no task is ever dropped because of the flag.
pub struct AdmissionGate {
    manager: Arc<ResourceManager>,
    pool: Arc<WorkerPool>,
}

impl AdmissionGate {
    /// Creates a gate over the given manager and pool.
    pub fn new(manager: Arc<ResourceManager>, pool: Arc<WorkerPool>) -> Self {
        Self { manager, pool }
    }

    /// Submits a decoded image for inference.
    ///
    /// Suspends while admission is blocked. Returns a queue-capacity or
    /// shutdown error from the pool; both mean the task was not accepted.
    pub async fn submit(&self, image: PixelBuffer) -> Result<PendingInference, SubmitError> {
        self.manager.wait_admitted().await;
        self.pool.enqueue(image)
    }

    /// The resource manager this gate consults.
    pub fn manager(&self) -> &Arc<ResourceManager> {
        &self.manager
    }

    /// The pool this gate feeds.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PipelineHandle;
    use std::time::Duration;

    fn handles(a: i32, b: i32) -> EngineHandles {
        EngineHandles {
            detection: PipelineHandle(a),
            recognition: PipelineHandle(b),
        }
    }

    #[test]
    fn test_starts_unblocked() {
        let manager = ResourceManager::new(handles(0, 1));
        assert!(!manager.is_blocked());
        assert_eq!(manager.failed_cycles(), 0);
    }

    #[test]
    fn test_quiescence_cycle_swaps_handles() {
        let manager = ResourceManager::new(handles(0, 1));

        manager.begin_quiescence();
        assert!(manager.is_blocked());
        assert_eq!(manager.handles(), handles(0, 1));

        manager.complete_quiescence(handles(2, 3));
        assert!(!manager.is_blocked());
        assert_eq!(manager.handles(), handles(2, 3));
    }

    #[test]
    fn test_failed_cycle_stays_blocked() {
        let manager = ResourceManager::new(handles(0, 1));
        manager.begin_quiescence();
        manager.fail_quiescence();
        assert!(manager.is_blocked());
        assert_eq!(manager.failed_cycles(), 1);
        // Handles untouched by the failed cycle.
        assert_eq!(manager.handles(), handles(0, 1));
    }

    #[tokio::test]
    async fn test_wait_admitted_returns_immediately_when_open() {
        let manager = ResourceManager::new(handles(0, 1));
        // Must not hang.
        tokio::time::timeout(Duration::from_millis(100), manager.wait_admitted())
            .await
            .expect("wait_admitted should not suspend while open");
    }

    #[tokio::test]
    async fn test_wait_admitted_suspends_until_unblocked() {
        let manager = Arc::new(ResourceManager::new(handles(0, 1)));
        manager.begin_quiescence();

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager.wait_admitted().await;
            })
        };

        // Still suspended after a short delay.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        manager.complete_quiescence(handles(2, 3));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after unblock")
            .unwrap();
    }
}
