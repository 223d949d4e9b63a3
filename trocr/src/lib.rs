//! TrOCR - Concurrent text recognition service
//!
//! This library provides the core functionality for serving OCR inference
//! over HTTP with a bounded worker pool and automatic device-memory
//! recovery.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use std::sync::Arc;
//! use trocr::config::ConfigFile;
//! use trocr::engine::MockEngine;
//! use trocr::service::OcrService;
//!
//! let service = OcrService::new(ConfigFile::default(), Arc::new(MockEngine::new()))?;
//! service.start_monitor();
//! service.serve().await?;
//! ```

pub mod admission;
pub mod api;
pub mod config;
pub mod engine;
pub mod logging;
pub mod monitor;
pub mod pool;
pub mod service;

/// Version of the trocr library and server.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
