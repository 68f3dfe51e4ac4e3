//! Configuration loading and environment resolution
//!
//! Settings follow a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is never fatal: the caller gets defaults and a warning.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable selecting the compute device (`cpu`, `cuda`, ...)
pub const DEVICE_ENV: &str = "AUDIO_SR_DEVICE";

/// Environment variable bounding the worker thread count
pub const THREADS_ENV: &str = "OMP_NUM_THREADS";

/// Device used when nothing else is configured
pub const DEFAULT_DEVICE: &str = "cpu";

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default location of the TOML file: `<config_dir>/vasr/vasr.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vasr").join("vasr.toml"))
}

/// Load a TOML config file into `T`
///
/// Missing file → `T::default()` with a warning. A file that exists but does
/// not parse is a configuration error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => path,
        None => {
            warn!("Could not determine config directory, using built-in defaults");
            return Ok(T::default());
        }
    };

    if !path.exists() {
        warn!("Config file not found: {}, using built-in defaults", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded config: {}", path.display());
    Ok(config)
}

/// Resolve the compute device: CLI → `AUDIO_SR_DEVICE` → TOML → `cpu`
pub fn resolve_device(cli_arg: Option<&str>, toml_value: Option<&str>) -> String {
    if let Some(device) = cli_arg.filter(|d| !d.trim().is_empty()) {
        return device.to_string();
    }
    if let Ok(device) = std::env::var(DEVICE_ENV) {
        if !device.trim().is_empty() {
            return device;
        }
    }
    if let Some(device) = toml_value.filter(|d| !d.trim().is_empty()) {
        return device.to_string();
    }
    DEFAULT_DEVICE.to_string()
}

/// Resolve the thread count: `OMP_NUM_THREADS` → TOML → all available cores
pub fn resolve_threads(toml_value: Option<usize>) -> usize {
    if let Ok(value) = std::env::var(THREADS_ENV) {
        match value.trim().parse::<usize>() {
            Ok(n) if n > 0 => return n,
            _ => warn!("Ignoring invalid {}={:?}", THREADS_ENV, value),
        }
    }
    if let Some(n) = toml_value.filter(|n| *n > 0) {
        return n;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
