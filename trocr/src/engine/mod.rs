//! Inference engine capability surface.
//!
//! The OCR engine itself is an external, stateful collaborator that owns
//! scarce device memory. This module defines the narrow capability set the
//! rest of the system consumes - pipeline initialization, inference, device
//! reset, and memory headroom - plus the data types that cross that boundary.
//!
//! Nothing here knows about HTTP, queues, or quiescence; the [`Engine`]
//! trait is the seam between scheduling and recognition.

mod mock;
mod types;

pub use mock::MockEngine;
pub use types::{
    BoundingBox, EngineHandles, MemoryInfo, PipelineHandle, PixelBuffer, TextRegion,
};

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// The two processing pipelines inside the engine.
///
/// Detection finds text regions in an image; recognition transcribes each
/// region. Each pipeline has its own model and its own device-side handle.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Pipeline {
    /// Text detection (region proposal).
    Detection,
    /// Text recognition (transcription).
    Recognition,
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detection => write!(f, "detection"),
            Self::Recognition => write!(f, "recognition"),
        }
    }
}

/// Errors that can occur at the engine boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Pipeline initialization failed.
    #[error("Failed to initialize {pipeline} pipeline: {reason}")]
    InitFailed {
        pipeline: Pipeline,
        reason: String,
    },

    /// Inference call failed.
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// Device reset failed.
    #[error("Device reset failed: {0}")]
    ResetFailed(String),

    /// Memory headroom query failed.
    #[error("Memory headroom query failed: {0}")]
    MemoryQueryFailed(String),

    /// The caller stopped waiting before a worker produced a result.
    #[error("Inference timed out after {waited:?}")]
    Timeout { waited: Duration },

    /// The pool is shutting down; the task was not executed.
    #[error("Engine unavailable: shutting down")]
    Unavailable,

    /// The worker exited without resolving the result slot.
    #[error("Worker exited before resolving result")]
    WorkerGone,
}

/// Capability surface of the external inference engine.
///
/// Implementations must be safe to share across worker threads. The engine
/// is stateful: pipeline handles become invalid after [`reset_device`] and
/// must be recreated with [`init_pipeline`] before the next inference.
///
/// [`reset_device`]: Engine::reset_device
/// [`init_pipeline`]: Engine::init_pipeline
pub trait Engine: Send + Sync {
    /// Initializes one pipeline on the given device slot, returning its handle.
    fn init_pipeline(
        &self,
        device_slot: u32,
        pipeline: Pipeline,
        model_path: &Path,
    ) -> Result<PipelineHandle, EngineError>;

    /// Runs detection + recognition over a pixel buffer.
    ///
    /// Returns the recognized regions in reading order. The handles must be
    /// a snapshot taken outside any reset window.
    fn infer(
        &self,
        handles: EngineHandles,
        image: &PixelBuffer,
    ) -> Result<Vec<TextRegion>, EngineError>;

    /// Resets the device, releasing all device memory.
    ///
    /// Invalidates every previously issued pipeline handle.
    fn reset_device(&self) -> Result<(), EngineError>;

    /// Returns current device memory usage.
    fn memory_headroom(&self) -> Result<MemoryInfo, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_display() {
        assert_eq!(format!("{}", Pipeline::Detection), "detection");
        assert_eq!(format!("{}", Pipeline::Recognition), "recognition");
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::InitFailed {
            pipeline: Pipeline::Detection,
            reason: "out of memory".to_string(),
        };
        assert!(err.to_string().contains("detection"));
        assert!(err.to_string().contains("out of memory"));

        let err = EngineError::Timeout {
            waited: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("timed out"));
    }
}
