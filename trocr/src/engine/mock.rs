//! Deterministic in-process engine for tests and device-less serving.

use super::{Engine, EngineError, EngineHandles, MemoryInfo, Pipeline, PipelineHandle};
use super::{BoundingBox, PixelBuffer, TextRegion};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Default simulated device memory (8 GB).
const DEFAULT_TOTAL_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Mock engine with controllable behavior.
///
/// Deterministic: `infer` echoes the leading ASCII-printable bytes of the
/// pixel buffer as the recognized text, falling back to `"{width}x{height}"`
/// for buffers with no printable prefix. This lets concurrency tests verify
/// that every result is paired with its own task.
///
/// Knobs:
/// - `with_infer_delay` simulates per-call processing time
/// - `with_memory_growth` makes each inference consume device memory,
///   which a reset releases
/// - `set_used_bytes` / `set_fail_inference` / `set_fail_reset` steer
///   individual scenarios at runtime
///
/// Every `init_pipeline` call hands out a fresh handle, so tests can check
/// that quiescence actually reinitializes the pipelines.
pub struct MockEngine {
    next_handle: AtomicI32,
    infer_delay: Duration,
    grow_per_infer: u64,
    total_bytes: u64,
    used_bytes: AtomicU64,
    fail_inference: AtomicBool,
    fail_reset: AtomicBool,
    infer_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    init_calls: AtomicUsize,
}

impl MockEngine {
    /// Creates a mock engine with no delay and an empty 8 GB device.
    pub fn new() -> Self {
        Self {
            next_handle: AtomicI32::new(0),
            infer_delay: Duration::ZERO,
            grow_per_infer: 0,
            total_bytes: DEFAULT_TOTAL_BYTES,
            used_bytes: AtomicU64::new(0),
            fail_inference: AtomicBool::new(false),
            fail_reset: AtomicBool::new(false),
            infer_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
        }
    }

    /// Sets a fixed processing delay per inference call.
    pub fn with_infer_delay(mut self, delay: Duration) -> Self {
        self.infer_delay = delay;
        self
    }

    /// Sets the simulated total device memory.
    pub fn with_total_memory(mut self, total_bytes: u64) -> Self {
        self.total_bytes = total_bytes;
        self
    }

    /// Makes each inference consume the given number of device bytes.
    pub fn with_memory_growth(mut self, bytes_per_infer: u64) -> Self {
        self.grow_per_infer = bytes_per_infer;
        self
    }

    /// Overrides the current device memory usage.
    pub fn set_used_bytes(&self, used: u64) {
        self.used_bytes.store(used, Ordering::SeqCst);
    }

    /// Makes subsequent `infer` calls fail.
    pub fn set_fail_inference(&self, fail: bool) {
        self.fail_inference.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `reset_device` calls fail.
    pub fn set_fail_reset(&self, fail: bool) {
        self.fail_reset.store(fail, Ordering::SeqCst);
    }

    /// Number of `infer` calls observed.
    pub fn infer_calls(&self) -> usize {
        self.infer_calls.load(Ordering::SeqCst)
    }

    /// Number of `reset_device` calls observed.
    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    /// Number of `init_pipeline` calls observed.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Extracts the echo text for a buffer: its ASCII-printable prefix,
    /// or `"{width}x{height}"` when the buffer starts with pixel data.
    fn echo_text(image: &PixelBuffer) -> String {
        let printable: String = image
            .data
            .iter()
            .take_while(|b| b.is_ascii_graphic() || **b == b' ')
            .map(|b| *b as char)
            .collect();

        if printable.is_empty() {
            format!("{}x{}", image.width, image.height)
        } else {
            printable
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MockEngine {
    fn init_pipeline(
        &self,
        _device_slot: u32,
        _pipeline: Pipeline,
        _model_path: &Path,
    ) -> Result<PipelineHandle, EngineError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        Ok(PipelineHandle(id))
    }

    fn infer(
        &self,
        _handles: EngineHandles,
        image: &PixelBuffer,
    ) -> Result<Vec<TextRegion>, EngineError> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);

        if !self.infer_delay.is_zero() {
            thread::sleep(self.infer_delay);
        }

        if self.fail_inference.load(Ordering::SeqCst) {
            return Err(EngineError::InferenceFailed("mock failure".to_string()));
        }

        if self.grow_per_infer > 0 {
            self.used_bytes
                .fetch_add(self.grow_per_infer, Ordering::SeqCst);
        }

        Ok(vec![TextRegion {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: image.width as f32,
                height: image.height as f32,
                angle: 0.0,
            },
            text: Self::echo_text(image),
            confidence: 1.0,
        }])
    }

    fn reset_device(&self) -> Result<(), EngineError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(EngineError::ResetFailed("mock reset failure".to_string()));
        }

        self.used_bytes.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn memory_headroom(&self) -> Result<MemoryInfo, EngineError> {
        Ok(MemoryInfo {
            used_bytes: self.used_bytes.load(Ordering::SeqCst),
            total_bytes: self.total_bytes,
        })
    }
}
