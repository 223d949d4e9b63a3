//! Service error types.

use crate::engine::EngineError;
use thiserror::Error;

/// Errors that can occur while wiring up or running the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Engine or pipeline initialization failed
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (socket bind, serve loop)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
