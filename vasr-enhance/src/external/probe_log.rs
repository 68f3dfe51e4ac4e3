//! Per-request probe log
//!
//! Operator-facing, append-only record of every candidate command tried for
//! one request: the command line, its exit code and captured output. Written
//! under `<output dir>/vasr_logs/` and never read back.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Subdirectory of the output directory holding probe logs
pub const LOG_DIR_NAME: &str = "vasr_logs";

#[derive(Debug, Clone)]
pub struct ProbeLog {
    path: Option<PathBuf>,
}

impl ProbeLog {
    /// Log file `<out_dir>/vasr_logs/<prefix>-<YYYYmmdd_HHMMSS>-<pid>.log`
    ///
    /// Falls back to `out_dir` itself when the log directory cannot be created.
    pub fn create(out_dir: &Path, prefix: &str) -> Self {
        let log_dir = out_dir.join(LOG_DIR_NAME);
        let log_dir = match fs::create_dir_all(&log_dir) {
            Ok(()) => log_dir,
            Err(e) => {
                debug!(dir = %log_dir.display(), error = %e, "Probe log directory unavailable");
                out_dir.to_path_buf()
            }
        };

        let file_name = format!(
            "{}-{}-{}.log",
            prefix,
            Local::now().format("%Y%m%d_%H%M%S"),
            std::process::id()
        );
        Self {
            path: Some(log_dir.join(file_name)),
        }
    }

    /// A log that records nothing
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one entry; failures are ignored
    pub fn append(&self, message: impl AsRef<str>) {
        let Some(path) = &self.path else {
            return;
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", message.as_ref()));
        if let Err(e) = result {
            debug!(path = %path.display(), error = %e, "Probe log write failed");
        }
    }

    /// Record one finished command
    pub fn record_command(&self, rc: i32, stdout: &str, stderr: &str) {
        self.append(format!(
            "RC={}\n--- STDOUT ---\n{}\n--- STDERR ---\n{}",
            rc, stdout, stderr
        ));
    }
}
