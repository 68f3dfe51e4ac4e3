//! Configuration for vasr-enhance
//!
//! Bootstrap settings read from TOML (see [`vasr_common::config`] for the
//! lookup rules). Command-line flags and environment variables override these
//! values in `main`.

use crate::external::forms::{self, CommandForm};
use crate::model::DiffusionParams;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;
use vasr_common::config::LoggingConfig;

/// Default chunk duration in seconds
pub const DEFAULT_CHUNK_DURATION: f64 = 5.0;

/// Default listening port of the request server
pub const DEFAULT_PORT: u16 = 45555;

/// Top-level TOML document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub cli: CliSettings,
    pub media: MediaSettings,
    pub logging: LoggingConfig,
    /// Compute device; `AUDIO_SR_DEVICE` and `--device` take priority
    pub device: Option<String>,
    /// Worker thread count; `OMP_NUM_THREADS` takes priority
    pub threads: Option<usize>,
    /// Segment length in seconds
    pub chunk_duration: Option<f64>,
}

impl TomlConfig {
    pub fn chunk_duration(&self) -> f64 {
        self.chunk_duration.unwrap_or(DEFAULT_CHUNK_DURATION)
    }
}

/// Which enhancement path the server dispatches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Segmented pipeline against the long-lived model worker
    Model,
    /// External command-line tool with the fallback ladder
    #[default]
    Cli,
    /// Refuse every request with rc 9
    Disabled,
}

/// Request server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Copy input to output instead of enhancing
    pub always_copy: bool,
    pub backend: BackendKind,
    /// Upper bound on simultaneously dispatched requests (unbounded if unset)
    pub max_concurrent: Option<usize>,
    /// Check that the enhancement package imports before accepting requests
    pub warmup: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            always_copy: false,
            backend: BackendKind::default(),
            max_concurrent: None,
            warmup: true,
        }
    }
}

/// Model worker settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model variant passed to the loader
    pub name: String,
    /// Python interpreter hosting the model
    pub python: String,
    pub seed: u64,
    pub guidance_scale: f64,
    pub ddim_steps: u32,
    pub latent_t_per_second: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let params = DiffusionParams::default();
        Self {
            name: "basic".to_string(),
            python: "python3".to_string(),
            seed: params.seed,
            guidance_scale: params.guidance_scale,
            ddim_steps: params.ddim_steps,
            latent_t_per_second: params.latent_t_per_second,
        }
    }
}

impl ModelSettings {
    pub fn params(&self) -> DiffusionParams {
        DiffusionParams {
            seed: self.seed,
            guidance_scale: self.guidance_scale,
            ddim_steps: self.ddim_steps,
            latent_t_per_second: self.latent_t_per_second,
        }
    }
}

const DEFAULT_POLL_TIMEOUT_SECS: f64 = 30.0;

/// Out-of-process tool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliSettings {
    /// Candidate forms tried by the server ladder
    pub forms: Option<Vec<CommandForm>>,
    /// Candidate forms tried by the single-run wrapper
    pub wrapper_forms: Option<Vec<CommandForm>>,
    pub poll_timeout_secs: f64,
    pub poll_interval_ms: u64,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            forms: None,
            wrapper_forms: None,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            poll_interval_ms: 500,
        }
    }
}

impl CliSettings {
    pub fn server_forms(&self) -> Vec<CommandForm> {
        self.forms.clone().unwrap_or_else(forms::server_forms)
    }

    pub fn wrapper_forms(&self) -> Vec<CommandForm> {
        self.wrapper_forms.clone().unwrap_or_else(forms::wrapper_forms)
    }

    /// Poll timeout; values that are not a representable duration fall back
    /// to the default
    pub fn poll_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_timeout_secs.max(0.0)).unwrap_or_else(|_| {
            warn!(
                value = self.poll_timeout_secs,
                "Invalid cli.poll_timeout_secs, using {}s", DEFAULT_POLL_TIMEOUT_SECS
            );
            Duration::from_secs_f64(DEFAULT_POLL_TIMEOUT_SECS)
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// External media tools used by the stereo fallback
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub ffprobe: String,
    pub ffmpeg: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}
