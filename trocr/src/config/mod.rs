//! Daemon configuration: INI file with `[server]`, `[pool]`, `[monitor]`,
//! and `[engine]` sections. Missing file or missing keys fall back to
//! defaults; CLI flags overlay the result in the server binary.

mod defaults;
mod file;
mod parser;
mod settings;

pub use defaults::*;
pub use file::ConfigFileError;
pub use settings::{
    ConfigFile, EngineSettings, HttpCompatMode, MonitorSettings, PoolSettings, ServerSettings,
};
