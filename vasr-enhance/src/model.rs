//! Super-resolution model handle
//!
//! The model itself is an external collaborator. This module defines the
//! interface the pipeline calls ([`SuperResolutionModel`]) and the production
//! handle ([`WorkerModel`]): a helper process that loads the model once at
//! start-up and then answers line-delimited JSON commands over its stdio.

use crate::error::{EnhanceError, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vasr_common::audio::read_audio;
use vasr_common::config::{DEVICE_ENV, THREADS_ENV};

/// Sampling parameters of one model call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffusionParams {
    pub seed: u64,
    pub guidance_scale: f64,
    pub ddim_steps: u32,
    pub latent_t_per_second: f64,
}

impl Default for DiffusionParams {
    fn default() -> Self {
        Self {
            seed: 42,
            guidance_scale: 3.5,
            ddim_steps: 30,
            latent_t_per_second: 12.8,
        }
    }
}

/// A loaded super-resolution model
///
/// Implementations are shared read-only between requests, hence `&self`.
pub trait SuperResolutionModel: Send + Sync {
    /// Enhance the audio file at `input`, returning a mono waveform at 48 kHz
    fn super_resolution(&self, input: &Path, params: &DiffusionParams) -> Result<Vec<f32>>;

    /// Release collectable garbage and cached accelerator allocations
    fn reclaim_memory(&self) {}
}

/// Python program run by [`WorkerModel`]
///
/// Replies go to the original stdout; everything the model libraries print
/// is redirected to stderr so it cannot corrupt the reply stream.
const WORKER_SCRIPT: &str = r#"
import gc, json, os, sys, warnings
warnings.filterwarnings("ignore")
os.environ.setdefault("TF_CPP_MIN_LOG_LEVEL", "3")
_reply_stream = sys.stdout
sys.stdout = sys.stderr

def reply(**fields):
    _reply_stream.write(json.dumps(fields) + "\n")
    _reply_stream.flush()

try:
    import numpy as np
    if not hasattr(np, "float"):
        np.float = float
    import torch
    import soundfile as sf
    from audiosr import build_model, super_resolution
except Exception as exc:
    reply(ok=False, error="audiosr import failed: %s" % exc)
    sys.exit(1)

torch.set_num_threads(int(os.environ.get("OMP_NUM_THREADS") or os.cpu_count() or 1))
model_name, device = sys.argv[1], sys.argv[2]
if device == "auto":
    device = "cuda" if torch.cuda.is_available() else "cpu"

try:
    model = build_model(model_name=model_name, device=device)
except Exception as exc:
    reply(ok=False, error=str(exc))
    sys.exit(2)

def reclaim():
    gc.collect()
    if torch.cuda.is_available():
        torch.cuda.empty_cache()

reply(ok=True, ready=True, device=device)

for line in sys.stdin:
    try:
        cmd = json.loads(line)
    except Exception as exc:
        reply(ok=False, error="bad command: %s" % exc)
        continue
    op = cmd.get("op")
    if op == "shutdown":
        reply(ok=True)
        break
    if op == "reclaim":
        reclaim()
        reply(ok=True)
        continue
    if op != "enhance":
        reply(ok=False, error="unknown op: %s" % op)
        continue
    try:
        with torch.no_grad():
            wave = super_resolution(
                model,
                cmd["input"],
                seed=cmd["seed"],
                guidance_scale=cmd["guidance_scale"],
                ddim_steps=cmd["ddim_steps"],
                latent_t_per_second=cmd["latent_t_per_second"],
            )
        res = wave.squeeze()
        if hasattr(res, "cpu"):
            res = res.cpu()
        if hasattr(res, "numpy"):
            res = res.numpy()
        sf.write(cmd["output"], np.asarray(res, dtype="float32"), 48000, subtype="FLOAT")
        del wave, res
        reply(ok=True)
    except Exception as exc:
        reply(ok=False, error=str(exc))
"#;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WorkerCommand<'a> {
    Enhance {
        input: &'a Path,
        output: &'a Path,
        #[serde(flatten)]
        params: &'a DiffusionParams,
    },
    Reclaim,
    Shutdown,
}

#[derive(Debug, Deserialize)]
struct WorkerReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    device: Option<String>,
}

struct WorkerPipe {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerPipe {
    fn exchange(&mut self, command: &WorkerCommand<'_>) -> Result<WorkerReply> {
        let line = serde_json::to_string(command)
            .map_err(|e| EnhanceError::EnhancementFailure(format!("encode command: {}", e)))?;
        writeln!(self.stdin, "{}", line)?;
        self.stdin.flush()?;
        self.read_reply()
    }

    fn read_reply(&mut self) -> Result<WorkerReply> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            let status = self.child.try_wait().ok().flatten();
            return Err(EnhanceError::EnhancementFailure(format!(
                "model worker exited ({})",
                status.map(|s| s.to_string()).unwrap_or_else(|| "no status".into())
            )));
        }
        serde_json::from_str(line.trim()).map_err(|e| {
            EnhanceError::EnhancementFailure(format!("unreadable worker reply {:?}: {}", line.trim(), e))
        })
    }
}

/// Model handle backed by a long-lived Python worker process
///
/// The model is loaded once in [`WorkerModel::spawn`]. Calls are serialised
/// through a mutex since the worker has a single command pipe.
pub struct WorkerModel {
    pipe: Mutex<WorkerPipe>,
    scratch_dir: PathBuf,
    device: String,
}

impl WorkerModel {
    /// Start the worker and wait until the model is loaded
    pub fn spawn(python: &str, model_name: &str, device: &str, threads: usize) -> Result<Self> {
        info!(python, model = model_name, device, threads, "Starting model worker");

        let mut child = Command::new(python)
            .arg("-u")
            .arg("-c")
            .arg(WORKER_SCRIPT)
            .arg(model_name)
            .arg(device)
            .env(THREADS_ENV, threads.to_string())
            .env(DEVICE_ENV, device)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EnhanceError::InvocationNotFound {
                    program: python.to_string(),
                },
                _ => EnhanceError::EnhancementFailure(format!("spawn {}: {}", python, e)),
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, BufReader::new(stdout)),
            _ => {
                let _ = child.kill();
                return Err(EnhanceError::EnhancementFailure(
                    "model worker stdio unavailable".into(),
                ));
            }
        };

        let mut pipe = WorkerPipe {
            child,
            stdin,
            stdout,
        };
        let ready = match pipe.read_reply() {
            Ok(reply) => reply,
            Err(e) => {
                let _ = pipe.child.kill();
                let _ = pipe.child.wait();
                return Err(e);
            }
        };
        if !ready.ok {
            let _ = pipe.child.wait();
            return Err(EnhanceError::from_model_message(
                ready.error.unwrap_or_else(|| "model failed to load".into()),
            ));
        }

        let device = ready.device.unwrap_or_else(|| device.to_string());
        info!(device = %device, "Model loaded");

        Ok(Self {
            pipe: Mutex::new(pipe),
            scratch_dir: std::env::temp_dir(),
            device,
        })
    }

    /// Device the worker actually loaded the model on
    pub fn device(&self) -> &str {
        &self.device
    }

    fn lock(&self) -> MutexGuard<'_, WorkerPipe> {
        // A panic while holding the lock leaves the pipe usable or dead;
        // either way the next exchange reports it.
        self.pipe.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SuperResolutionModel for WorkerModel {
    fn super_resolution(&self, input: &Path, params: &DiffusionParams) -> Result<Vec<f32>> {
        let output = self
            .scratch_dir
            .join(format!("vasr_model_{}.wav", Uuid::new_v4()));

        let reply = self.lock().exchange(&WorkerCommand::Enhance {
            input,
            output: &output,
            params,
        });

        let result = match reply {
            Ok(reply) if reply.ok => read_audio(&output)
                .map(|buffer| {
                    if buffer.channel_count() == 1 {
                        buffer.into_channels().remove(0)
                    } else {
                        buffer.downmix()
                    }
                })
                .map_err(EnhanceError::from),
            Ok(reply) => Err(EnhanceError::from_model_message(
                reply.error.unwrap_or_else(|| "model call failed".into()),
            )),
            Err(e) => Err(e),
        };

        if output.exists() {
            if let Err(e) = std::fs::remove_file(&output) {
                warn!(path = %output.display(), error = %e, "Failed to remove model output");
            }
        }
        result
    }

    fn reclaim_memory(&self) {
        match self.lock().exchange(&WorkerCommand::Reclaim) {
            Ok(reply) if reply.ok => debug!("Model memory reclaimed"),
            Ok(reply) => warn!(error = ?reply.error, "Model memory reclaim refused"),
            Err(e) => warn!(error = %e, "Model memory reclaim failed"),
        }
    }
}

impl Drop for WorkerModel {
    fn drop(&mut self) {
        let pipe = self.pipe.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if pipe.exchange(&WorkerCommand::Shutdown).is_err() {
            let _ = pipe.child.kill();
        }
        let _ = pipe.child.wait();
    }
}
