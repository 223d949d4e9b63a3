//! OCR service facade implementation.

use super::error::ServiceError;
use crate::admission::{AdmissionGate, ResourceManager};
use crate::api::{create_router, AppState};
use crate::config::ConfigFile;
use crate::engine::{Engine, EngineHandles, Pipeline};
use crate::monitor::MemoryMonitor;
use crate::pool::WorkerPool;
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// High-level facade for the OCR service.
///
/// Encapsulates component creation and wiring: pipeline initialization,
/// the worker pool, the admission gate, the memory monitor, and the HTTP
/// router. The binary only constructs this, starts the monitor, and
/// serves.
pub struct OcrService {
    /// Service configuration
    config: ConfigFile,
    /// Inference engine shared by workers and the monitor
    engine: Arc<dyn Engine>,
    /// Block flag and pipeline handle owner
    manager: Arc<ResourceManager>,
    /// Fixed-size inference worker pool
    pool: Arc<WorkerPool>,
    /// Admission gate in front of the pool
    gate: Arc<AdmissionGate>,
    /// Cancellation for the monitor and the serve loop
    shutdown: CancellationToken,
    /// Running monitor task, if started
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl OcrService {
    /// Create a new OCR service from configuration.
    ///
    /// Initializes both pipelines on the configured device slot, then
    /// wires the resource manager, worker pool, and admission gate.
    ///
    /// # Errors
    ///
    /// Returns an error if either pipeline fails to initialize.
    pub fn new(config: ConfigFile, engine: Arc<dyn Engine>) -> Result<Self, ServiceError> {
        let detection = engine.init_pipeline(
            config.engine.device_slot,
            Pipeline::Detection,
            &config.engine.detection_model,
        )?;
        let recognition = engine.init_pipeline(
            config.engine.device_slot,
            Pipeline::Recognition,
            &config.engine.recognition_model,
        )?;
        info!(
            device_slot = config.engine.device_slot,
            "Initialized detection and recognition pipelines"
        );

        let manager = Arc::new(ResourceManager::new(EngineHandles {
            detection,
            recognition,
        }));
        let pool = Arc::new(WorkerPool::new(
            config.pool.workers,
            config.pool.queue_capacity,
            Arc::clone(&engine),
            Arc::clone(&manager),
        ));
        let gate = Arc::new(AdmissionGate::new(Arc::clone(&manager), Arc::clone(&pool)));

        Ok(Self {
            config,
            engine,
            manager,
            pool,
            gate,
            shutdown: CancellationToken::new(),
            monitor_task: Mutex::new(None),
        })
    }

    /// Starts the memory monitor as a background task.
    ///
    /// Idempotent in effect: calling twice spawns a second monitor, so the
    /// binary calls this exactly once after construction.
    pub fn start_monitor(&self) {
        let monitor = MemoryMonitor::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.manager),
            Arc::clone(&self.pool),
            self.config.engine.device_slot,
            self.config.engine.detection_model.clone(),
            self.config.engine.recognition_model.clone(),
        )
        .with_check_interval(Duration::from_millis(self.config.monitor.check_interval_ms))
        .with_threshold(self.config.monitor.memory_threshold);

        let token = self.shutdown.clone();
        let handle = tokio::spawn(monitor.run(token));

        if let Ok(mut slot) = self.monitor_task.lock() {
            *slot = Some(handle);
        }
    }

    /// Builds the HTTP router backed by this service's admission gate.
    pub fn router(&self) -> Router {
        let state = AppState::new(
            Arc::clone(&self.gate),
            self.config.server.compat_mode,
            Duration::from_secs(self.config.pool.infer_timeout_secs),
        );
        create_router(state)
    }

    /// Binds the configured address and serves HTTP until shutdown.
    pub async fn serve(&self) -> Result<(), ServiceError> {
        let addr = self.config.server.bind_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "OCR service listening");

        let token = self.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;
        Ok(())
    }

    /// Stops the monitor, drains the worker pool, and joins its threads.
    ///
    /// In-flight tasks finish; queued tasks that never started resolve as
    /// unavailable.
    pub async fn shutdown(&self) {
        info!("Shutting down OCR service");
        self.shutdown.cancel();

        let handle = self
            .monitor_task
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Memory monitor task panicked");
            }
        }

        let pool = Arc::clone(&self.pool);
        let joined = tokio::task::spawn_blocking(move || pool.shutdown()).await;
        if let Err(e) = joined {
            error!(error = %e, "Worker pool shutdown task panicked");
        }
    }

    /// The admission gate (handle submission directly, e.g. from tests).
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// The resource manager owning the block flag.
    pub fn manager(&self) -> &Arc<ResourceManager> {
        &self.manager
    }

    /// The worker pool.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// The loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    fn service() -> OcrService {
        let engine = Arc::new(MockEngine::new());
        OcrService::new(ConfigFile::default(), engine).unwrap()
    }

    #[test]
    fn test_new_initializes_both_pipelines() {
        let engine = Arc::new(MockEngine::new());
        let engine_dyn: Arc<dyn Engine> = engine.clone();
        let svc = OcrService::new(ConfigFile::default(), engine_dyn).unwrap();
        assert_eq!(engine.init_calls(), 2);
        let handles = svc.manager().handles();
        assert_ne!(handles.detection, handles.recognition);
    }

    #[test]
    fn test_new_propagates_init_failure() {
        // An engine that cannot produce handles surfaces at construction.
        struct BrokenEngine;
        impl Engine for BrokenEngine {
            fn init_pipeline(
                &self,
                _device_slot: u32,
                pipeline: Pipeline,
                _model_path: &std::path::Path,
            ) -> Result<crate::engine::PipelineHandle, crate::engine::EngineError> {
                Err(crate::engine::EngineError::InitFailed {
                    pipeline,
                    reason: "no device".to_string(),
                })
            }
            fn infer(
                &self,
                _handles: EngineHandles,
                _image: &crate::engine::PixelBuffer,
            ) -> Result<Vec<crate::engine::TextRegion>, crate::engine::EngineError> {
                unreachable!()
            }
            fn reset_device(&self) -> Result<(), crate::engine::EngineError> {
                Ok(())
            }
            fn memory_headroom(
                &self,
            ) -> Result<crate::engine::MemoryInfo, crate::engine::EngineError> {
                unreachable!()
            }
        }

        let result = OcrService::new(ConfigFile::default(), Arc::new(BrokenEngine));
        assert!(matches!(result, Err(ServiceError::Engine(_))));
    }

    #[tokio::test]
    async fn test_shutdown_without_monitor_completes() {
        let svc = service();
        svc.shutdown().await;
        assert!(svc.pool().enqueue(crate::engine::PixelBuffer::grayscale(vec![0], 1, 1)).is_err());
    }

    #[test]
    fn test_pool_sized_from_config() {
        let svc = service();
        assert_eq!(svc.pool().size(), svc.config().pool.workers);
    }
}
