//! Single-run wrapper mode
//!
//! Tries the wrapper form list once for one file. After a candidate exits 0
//! the wrapper waits for its product to show up (the tool may still be
//! flushing) and copies it to the output path. When every candidate fails
//! the input is copied unchanged, so an output file always exists.
//!
//! Exit codes: 0 output written (enhanced or copied), 1 final copy failed,
//! 2 product found but could not be copied.

use super::copy_file;
use super::forms::RenderedCommand;
use super::runner::{run_command, CandidateRunner};
use crate::locator::{poll_for_output, same_file};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_COPY_FAILED: i32 = 2;

pub struct Wrapper {
    runner: CandidateRunner,
    poll_timeout: Duration,
    poll_interval: Duration,
}

impl Wrapper {
    pub fn new(runner: CandidateRunner, poll_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            runner,
            poll_timeout,
            poll_interval,
        }
    }

    pub fn run(&self, input: &Path, output: &Path) -> i32 {
        let out_dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let fallback_dirs = fallback_dirs(input, &out_dir);

        for form in self.runner.forms() {
            let cmd = form.render(&self.runner.context(input, output, &out_dir));
            info!(command = %cmd, "Trying CLI");

            let outcome = self.runner.execute(&cmd);
            if !outcome.stdout.is_empty() {
                debug!(stdout = %outcome.stdout.trim_end(), "CLI output");
            }
            if !outcome.stderr.is_empty() {
                debug!(stderr = %outcome.stderr.trim_end(), "CLI error output");
            }

            if !outcome.succeeded() {
                warn!(rc = outcome.rc, "CLI command failed");
                continue;
            }

            let mut dirs = Vec::new();
            if let Some(search_dir) = &cmd.search_dir {
                dirs.push(search_dir.clone());
            }
            push_unique(&mut dirs, &fallback_dirs);

            match poll_for_output(output, &dirs, input, self.poll_timeout, self.poll_interval) {
                Some(found) if same_file(&found, output) => {
                    info!(output = %output.display(), "Output found");
                    return EXIT_OK;
                }
                Some(found) => {
                    return match copy_file(&found, output) {
                        Ok(()) => {
                            info!(from = %found.display(), to = %output.display(), "Copied produced file");
                            EXIT_OK
                        }
                        Err(e) => {
                            warn!(from = %found.display(), error = %e, "Failed to copy produced file");
                            EXIT_COPY_FAILED
                        }
                    };
                }
                None => warn!(
                    output = %output.display(),
                    "CLI returned 0 but expected output not found after wait"
                ),
            }
        }

        match copy_file(input, output) {
            Ok(()) => {
                warn!(output = %output.display(), "No candidate produced output, input copied unchanged");
                EXIT_OK
            }
            Err(e) => {
                warn!(error = %e, "Final fallback copy failed");
                EXIT_FAILED
            }
        }
    }
}

/// Run a user-supplied command template once
///
/// The template is split on whitespace; `{input}` and `{output}` are
/// substituted in every word. Returns the command's exit code (127 when the
/// program is missing).
pub fn run_template(template: &str, input: &Path, output: &Path, runner: &CandidateRunner) -> i32 {
    let mut words = template.split_whitespace().map(|w| {
        w.replace("{input}", &input.to_string_lossy())
            .replace("{output}", &output.to_string_lossy())
    });
    let Some(program) = words.next() else {
        warn!("Empty command template");
        return EXIT_FAILED;
    };
    let cmd = RenderedCommand {
        program,
        args: words.collect(),
        search_dir: None,
    };

    info!(command = %cmd, "Running command template");
    let outcome = run_command(&cmd, runner.env());
    if !outcome.succeeded() {
        warn!(rc = outcome.rc, stderr = %outcome.stderr.trim_end(), "Command template failed");
    }
    outcome.rc
}

/// Output dir, input dir, temp dir and working dir, without duplicates
fn fallback_dirs(input: &Path, out_dir: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![out_dir.to_path_buf()];
    let mut rest = Vec::new();
    if let Some(parent) = input.parent().filter(|p| !p.as_os_str().is_empty()) {
        rest.push(parent.to_path_buf());
    }
    rest.push(std::env::temp_dir());
    if let Ok(cwd) = std::env::current_dir() {
        rest.push(cwd);
    }
    push_unique(&mut dirs, &rest);
    dirs
}

fn push_unique(dirs: &mut Vec<PathBuf>, extra: &[PathBuf]) {
    for dir in extra {
        if !dirs.iter().any(|d| d == dir) {
            dirs.push(dir.clone());
        }
    }
}
