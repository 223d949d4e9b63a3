//! High-level service facade for the OCR daemon.
//!
//! This module provides a simplified API that encapsulates all component
//! wiring: pipeline initialization, the worker pool, the admission gate,
//! the memory monitor, and the HTTP router.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trocr::config::ConfigFile;
//! use trocr::engine::MockEngine;
//! use trocr::service::OcrService;
//!
//! let config = ConfigFile::default();
//! let service = OcrService::new(config, Arc::new(MockEngine::new()))?;
//! service.start_monitor();
//! service.serve().await?;
//! ```

mod error;
mod facade;

pub use error::ServiceError;
pub use facade::OcrService;
