//! Configuration file loading.
//!
//! Settings structs live in [`super::settings`], constants in
//! [`super::defaults`], and key mapping in [`super::parser`].

use super::settings::ConfigFile;
use ini::Ini;
use std::path::Path;
use thiserror::Error;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigFile {
    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = ConfigFile::load_from(&config_path).unwrap();
        let default = ConfigFile::default();
        assert_eq!(config.server.port, default.server.port);
        assert_eq!(config.pool.workers, default.pool.workers);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "[server]").unwrap();
        writeln!(file, "port = 7007").unwrap();
        drop(file);

        let config = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(config.server.port, 7007);
    }
}
