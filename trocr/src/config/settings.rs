//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types; defaults live in [`super::defaults`] and
//! parsing in [`super::parser`].

use std::path::PathBuf;
use std::str::FromStr;

/// Complete daemon configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// HTTP server settings
    pub server: ServerSettings,
    /// Worker pool settings
    pub pool: PoolSettings,
    /// Memory monitor settings
    pub monitor: MonitorSettings,
    /// Engine settings
    pub engine: EngineSettings,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Host to bind (default: localhost)
    pub host: String,
    /// Port to bind (default: 6006)
    pub port: u16,
    /// Status-code behavior for error responses
    pub compat_mode: HttpCompatMode,
}

impl ServerSettings {
    /// Returns the `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Number of worker threads
    pub workers: usize,
    /// Pending-task queue capacity
    pub queue_capacity: usize,
    /// Per-request inference wait timeout in seconds
    pub infer_timeout_secs: u64,
}

/// Memory monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Interval between headroom checks in milliseconds
    pub check_interval_ms: u64,
    /// Usage fraction (0.0-1.0) that triggers a reset cycle
    pub memory_threshold: f64,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Device slot for pipeline initialization
    pub device_slot: u32,
    /// Path to the detection model
    pub detection_model: PathBuf,
    /// Path to the recognition model
    pub recognition_model: PathBuf,
}

/// How error responses carry HTTP status codes.
///
/// The reference service answered every error with status 200 and a
/// plain-text message; `Legacy` preserves that byte-for-byte. `Strict`
/// keeps the bodies but uses real status codes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HttpCompatMode {
    /// All responses use status 200 (reference behavior).
    #[default]
    Legacy,
    /// Errors use 400/422/500/503 with the same bodies.
    Strict,
}

impl FromStr for HttpCompatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown compat mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for HttpCompatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let server = ServerSettings {
            host: "localhost".to_string(),
            port: 6006,
            compat_mode: HttpCompatMode::Legacy,
        };
        assert_eq!(server.bind_addr(), "localhost:6006");
    }

    #[test]
    fn test_compat_mode_parse() {
        assert_eq!(
            "legacy".parse::<HttpCompatMode>().unwrap(),
            HttpCompatMode::Legacy
        );
        assert_eq!(
            "STRICT".parse::<HttpCompatMode>().unwrap(),
            HttpCompatMode::Strict
        );
        assert!("lenient".parse::<HttpCompatMode>().is_err());
    }
}
