//! Default values for all configuration settings.

use super::settings::*;
use crate::monitor::DEFAULT_MEMORY_THRESHOLD;
use crate::pool::{DEFAULT_POOL_SIZE, DEFAULT_QUEUE_CAPACITY};
use std::path::PathBuf;

/// Default bind host (reference behavior: loopback only).
pub const DEFAULT_HOST: &str = "localhost";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 6006;

/// Default per-request inference wait timeout.
pub const DEFAULT_INFER_TIMEOUT_SECS: u64 = 30;

/// Default memory check interval.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 1000;

/// Default device slot.
pub const DEFAULT_DEVICE_SLOT: u32 = 0;

/// Default detection model path.
pub const DEFAULT_DETECTION_MODEL: &str = "models/ctpn.bin";

/// Default recognition model path.
pub const DEFAULT_RECOGNITION_MODEL: &str = "models/crnn.bin";

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            pool: PoolSettings::default(),
            monitor: MonitorSettings::default(),
            engine: EngineSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            compat_mode: HttpCompatMode::Legacy,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            infer_timeout_secs: DEFAULT_INFER_TIMEOUT_SECS,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            device_slot: DEFAULT_DEVICE_SLOT,
            detection_model: PathBuf::from(DEFAULT_DETECTION_MODEL),
            recognition_model: PathBuf::from(DEFAULT_RECOGNITION_MODEL),
        }
    }
}
