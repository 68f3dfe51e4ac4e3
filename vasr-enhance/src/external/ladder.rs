//! Fallback ladder for the out-of-process server backend
//!
//! Tiers, each tried only when the previous one produced nothing:
//!
//! 1. run the candidate forms on the whole file
//! 2. for inputs with two or more channels: split, enhance each channel
//!    through the candidates, merge
//! 3. copy the input unchanged to the output and report a non-zero code
//!
//! Every request ends with some file at the output path.

use super::media_tools::MediaTools;
use super::probe_log::ProbeLog;
use super::runner::{CandidateOutcome, CandidateRunner};
use super::{copy_file, output_dir, ScratchDir};
use crate::error::{EnhanceError, Result};
use crate::locator::same_file;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vasr_common::protocol::{ServerResponse, RC_FAILURE};

const LOG_PREFIX: &str = "vasr_server";

pub struct FallbackLadder {
    runner: CandidateRunner,
    media: MediaTools,
}

impl FallbackLadder {
    pub fn new(runner: CandidateRunner, media: MediaTools) -> Self {
        Self { runner, media }
    }

    /// Enhance `input` into `output`, walking the tiers
    pub fn run(&self, input: &Path, output: &Path) -> ServerResponse {
        let log = ProbeLog::create(&output_dir(output), LOG_PREFIX);
        log.append(format!("Request input={} output={}", input.display(), output.display()));

        let scratch = match ScratchDir::create("vasr_") {
            Ok(scratch) => scratch,
            Err(e) => {
                warn!(error = %e, "Could not create scratch directory");
                return fallback_copy(input, output, RC_FAILURE, String::new(), e.to_string(), &log);
            }
        };

        // Tier 1: whole file
        let whole = self.runner.run_and_locate(input, output, scratch.path(), &log);
        if let Some(produced) = whole.produced() {
            return deliver(produced, output, whole.stdout.clone(), whole.stderr.clone(), &log);
        }

        // Tier 2: per channel
        let channels = self.media.probe_channels(input);
        log.append(format!("Input channels: {}", channels));
        if channels >= 2 {
            return match self.stereo(input, output, &log) {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Stereo fallback failed, copying input");
                    log.append(format!("Stereo fallback failed: {}", e));
                    fallback_copy(input, output, RC_FAILURE, String::new(), e.to_string(), &log)
                }
            };
        }

        // Tier 3: copy
        let mut stderr = whole.stderr;
        if let Err(e) = &whole.result {
            stderr.push_str(&format!("\n{}", e));
        }
        fallback_copy(input, output, whole.rc, whole.stdout, stderr, &log)
    }

    /// Split, enhance each channel independently, merge
    ///
    /// A channel whose enhancement locates nothing is merged un-enhanced,
    /// but at least one channel must be enhanced for the merge to count.
    fn stereo(&self, input: &Path, output: &Path, log: &ProbeLog) -> Result<ServerResponse> {
        let scratch = ScratchDir::create("vasr_")?;
        let left = scratch.path().join("left.wav");
        let right = scratch.path().join("right.wav");
        self.media.split_stereo(input, &left, &right, log)?;

        let (left_out, left_run) = self.enhance_channel(&scratch, "left", &left, log)?;
        let (right_out, right_run) = self.enhance_channel(&scratch, "right", &right, log)?;

        let unenhanced: Vec<&str> = [("left", &left_run), ("right", &right_run)]
            .into_iter()
            .filter(|(_, run)| run.produced().is_none())
            .map(|(label, _)| label)
            .collect();
        if unenhanced.len() == 2 {
            return Err(EnhanceError::EnhancementFailure(
                "no channel produced enhanced output".to_string(),
            ));
        }

        let merged = scratch.path().join("merged.wav");
        let merge_stderr = self.media.merge_stereo(&left_out, &right_out, &merged, log)?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        if std::fs::rename(&merged, output).is_err() {
            std::fs::copy(&merged, output)?;
        }
        info!(output = %output.display(), "Stereo fallback merged");

        let mut stderr = format!("{}\n{}\n{}", left_run.stderr, right_run.stderr, merge_stderr);
        for label in unenhanced {
            let note = format!("{} channel not enhanced; merged unchanged", label);
            log.append(&note);
            stderr.push('\n');
            stderr.push_str(&note);
        }
        Ok(ServerResponse::new(0, format!("{}\n{}", left_run.stdout, right_run.stdout), stderr))
    }

    fn enhance_channel(
        &self,
        scratch: &ScratchDir,
        label: &str,
        channel_file: &Path,
        log: &ProbeLog,
    ) -> Result<(PathBuf, CandidateOutcome)> {
        let save_dir = scratch.subdir(&format!("{}_out", label))?;
        let expected = save_dir.join(format!("{}_enhanced.wav", label));
        let run = self.runner.run_and_locate(channel_file, &expected, &save_dir, log);
        let path = match run.produced() {
            Some(path) => path.to_path_buf(),
            None => {
                warn!(channel = label, "Channel not enhanced, merging original");
                channel_file.to_path_buf()
            }
        };
        Ok((path, run))
    }
}

/// Copy a located product to the output path
fn deliver(produced: &Path, output: &Path, stdout: String, stderr: String, log: &ProbeLog) -> ServerResponse {
    if same_file(produced, output) {
        return ServerResponse::new(0, stdout, stderr);
    }
    match copy_file(produced, output) {
        Ok(()) => {
            log.append(format!("Copied produced file {} -> {}", produced.display(), output.display()));
            info!(from = %produced.display(), to = %output.display(), "Enhanced output delivered");
            ServerResponse::new(0, stdout, stderr)
        }
        Err(e) => {
            log.append(format!("Copy failed: {}", e));
            ServerResponse::new(RC_FAILURE, stdout, format!("{}\ncopy failed: {}", stderr, e))
        }
    }
}

/// Last tier: the un-enhanced input becomes the output
fn fallback_copy(
    input: &Path,
    output: &Path,
    rc: i32,
    stdout: String,
    stderr: String,
    log: &ProbeLog,
) -> ServerResponse {
    let rc = if rc == 0 { RC_FAILURE } else { rc };
    let note = match copy_file(input, output) {
        Ok(()) => "no enhanced output produced; input copied unchanged".to_string(),
        Err(e) => {
            log.append(format!("Final fallback copy failed: {}", e));
            format!("fallback copy failed: {}", e)
        }
    };
    log.append(&note);
    warn!(input = %input.display(), output = %output.display(), rc, "{}", note);
    ServerResponse::new(rc, stdout, format!("{}\n{}", stderr, note))
}
