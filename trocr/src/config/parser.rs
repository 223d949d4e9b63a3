//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.
//! Starts from `ConfigFile::default()` and overlays any values found.

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use ini::Ini;
use std::path::PathBuf;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an `Ini` object into a `ConfigFile`.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [server] section
    if let Some(section) = ini.section(Some("server")) {
        if let Some(v) = section.get("host") {
            let v = v.trim();
            if !v.is_empty() {
                config.server.host = v.to_string();
            }
        }
        if let Some(v) = section.get("port") {
            config.server.port = v
                .parse()
                .map_err(|_| invalid("server", "port", v, "expected a port number"))?;
        }
        if let Some(v) = section.get("compat_mode") {
            config.server.compat_mode = v
                .parse()
                .map_err(|_| invalid("server", "compat_mode", v, "must be 'legacy' or 'strict'"))?;
        }
    }

    // [pool] section
    if let Some(section) = ini.section(Some("pool")) {
        if let Some(v) = section.get("workers") {
            let workers: usize = v
                .parse()
                .map_err(|_| invalid("pool", "workers", v, "expected a positive integer"))?;
            if workers == 0 {
                return Err(invalid("pool", "workers", v, "must be at least 1"));
            }
            config.pool.workers = workers;
        }
        if let Some(v) = section.get("queue_capacity") {
            let capacity: usize = v
                .parse()
                .map_err(|_| invalid("pool", "queue_capacity", v, "expected a positive integer"))?;
            if capacity == 0 {
                return Err(invalid("pool", "queue_capacity", v, "must be at least 1"));
            }
            config.pool.queue_capacity = capacity;
        }
        if let Some(v) = section.get("infer_timeout_secs") {
            config.pool.infer_timeout_secs = v.parse().map_err(|_| {
                invalid("pool", "infer_timeout_secs", v, "expected seconds as an integer")
            })?;
        }
    }

    // [monitor] section
    if let Some(section) = ini.section(Some("monitor")) {
        if let Some(v) = section.get("check_interval_ms") {
            config.monitor.check_interval_ms = v.parse().map_err(|_| {
                invalid(
                    "monitor",
                    "check_interval_ms",
                    v,
                    "expected milliseconds as an integer",
                )
            })?;
        }
        if let Some(v) = section.get("memory_threshold") {
            let threshold: f64 = v.parse().map_err(|_| {
                invalid("monitor", "memory_threshold", v, "expected a fraction like 0.7")
            })?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(invalid(
                    "monitor",
                    "memory_threshold",
                    v,
                    "must be between 0.0 and 1.0",
                ));
            }
            config.monitor.memory_threshold = threshold;
        }
    }

    // [engine] section
    if let Some(section) = ini.section(Some("engine")) {
        if let Some(v) = section.get("device_slot") {
            config.engine.device_slot = v
                .parse()
                .map_err(|_| invalid("engine", "device_slot", v, "expected a slot index"))?;
        }
        if let Some(v) = section.get("detection_model") {
            let v = v.trim();
            if !v.is_empty() {
                config.engine.detection_model = PathBuf::from(v);
            }
        }
        if let Some(v) = section.get("recognition_model") {
            let v = v.trim();
            if !v.is_empty() {
                config.engine.recognition_model = PathBuf::from(v);
            }
        }
    }

    Ok(config)
}
