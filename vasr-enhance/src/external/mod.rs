//! Out-of-process enhancement
//!
//! Drives an external command-line tool whose flags and output location are
//! not stable: candidate forms as data ([`forms`]), execution and output
//! discovery ([`runner`]), the server's fallback ladder ([`ladder`]) and the
//! single-run wrapper ([`wrapper`]).

pub mod forms;
pub mod ladder;
pub mod media_tools;
pub mod probe_log;
pub mod runner;
pub mod wrapper;

pub use forms::{CommandForm, OutputHint};
pub use ladder::FallbackLadder;
pub use media_tools::MediaTools;
pub use probe_log::ProbeLog;
pub use runner::{CandidateOutcome, CandidateRunner, ProcessEnv};
pub use wrapper::Wrapper;

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Private temporary directory, removed with its contents on drop
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(prefix: &str) -> io::Result<Self> {
        let path = std::env::temp_dir().join(format!("{}{}", prefix, Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (if needed) and return a subdirectory
    pub fn subdir(&self, name: &str) -> io::Result<PathBuf> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Scratch cleanup failed");
        }
    }
}

/// Directory an output path lives in; the temp dir for bare file names
pub fn output_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::temp_dir(),
    }
}

/// Copy `src` to `dst`, creating `dst`'s parent directories
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst).map(|_| ())
}

/// Check that `python` can import `module`
///
/// Warm-up only: a failure is logged and the caller carries on.
pub fn probe_python_module(python: &str, module: &str) -> bool {
    let status = Command::new(python)
        .arg("-c")
        .arg(format!("import {}", module))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output();

    match status {
        Ok(output) if output.status.success() => {
            info!(python, module, "Module import check passed");
            true
        }
        Ok(output) => {
            warn!(
                python,
                module,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Module import failed; server will still accept requests"
            );
            false
        }
        Err(e) => {
            warn!(python, module, error = %e, "Could not run interpreter for import check");
            false
        }
    }
}
