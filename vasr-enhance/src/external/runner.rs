//! Candidate command execution
//!
//! Runs command forms in order against one input until a product can be
//! located. Every attempt's outcome is an explicit [`Result`] carrying the
//! failure kind, so callers walk a ladder of values rather than nested
//! handlers.

use super::forms::{CommandForm, FormContext, RenderedCommand};
use super::probe_log::ProbeLog;
use crate::error::{EnhanceError, Result};
use crate::locator::OutputLocator;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use vasr_common::config::{DEVICE_ENV, THREADS_ENV};
use vasr_common::protocol::{RC_FAILURE, RC_NOT_FOUND};

/// Environment exported to every enhancement subprocess
#[derive(Debug, Clone)]
pub struct ProcessEnv {
    pub device: String,
    pub threads: usize,
}

/// Exit code and captured stdio of one command
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    pub rc: i32,
    pub stdout: String,
    pub stderr: String,
    /// Set when the program could not be started at all
    pub spawn_error: Option<ErrorKind>,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.rc == 0 && self.spawn_error.is_none()
    }
}

/// Run one rendered command to completion
///
/// A missing program yields rc 127; any other spawn failure yields rc 1.
pub fn run_command(cmd: &RenderedCommand, env: &ProcessEnv) -> CommandOutcome {
    let result = Command::new(&cmd.program)
        .args(&cmd.args)
        .env(THREADS_ENV, env.threads.to_string())
        .env(DEVICE_ENV, &env.device)
        .output();

    match result {
        Ok(output) => CommandOutcome {
            rc: output.status.code().unwrap_or(RC_FAILURE),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            spawn_error: None,
        },
        Err(e) => CommandOutcome {
            rc: if e.kind() == ErrorKind::NotFound {
                RC_NOT_FOUND
            } else {
                RC_FAILURE
            },
            stdout: String::new(),
            stderr: e.to_string(),
            spawn_error: Some(e.kind()),
        },
    }
}

/// Result of walking the candidate list
#[derive(Debug)]
pub struct CandidateOutcome {
    /// 0 when a product was located, else the last failure's code
    pub rc: i32,
    pub stdout: String,
    pub stderr: String,
    pub result: Result<PathBuf>,
}

impl CandidateOutcome {
    pub fn produced(&self) -> Option<&Path> {
        self.result.as_ref().ok().map(PathBuf::as_path)
    }
}

/// Tries command forms in order
#[derive(Debug, Clone)]
pub struct CandidateRunner {
    forms: Vec<CommandForm>,
    python: String,
    model: String,
    env: ProcessEnv,
}

impl CandidateRunner {
    pub fn new(forms: Vec<CommandForm>, python: &str, model: &str, env: ProcessEnv) -> Self {
        Self {
            forms,
            python: python.to_string(),
            model: model.to_string(),
            env,
        }
    }

    pub fn forms(&self) -> &[CommandForm] {
        &self.forms
    }

    pub fn env(&self) -> &ProcessEnv {
        &self.env
    }

    /// Placeholder values for one invocation
    pub fn context<'a>(&'a self, input: &'a Path, output: &'a Path, save_dir: &'a Path) -> FormContext<'a> {
        FormContext {
            python: &self.python,
            input,
            output,
            save_dir,
            device: &self.env.device,
            model: &self.model,
        }
    }

    pub fn execute(&self, cmd: &RenderedCommand) -> CommandOutcome {
        run_command(cmd, &self.env)
    }

    /// Run forms until one yields a locatable product
    ///
    /// `expected` is checked first after every attempt, then the form's
    /// search directory. A non-zero exit with a located product still counts
    /// as success. The input file itself is never reported as a product.
    pub fn run_and_locate(
        &self,
        input: &Path,
        expected: &Path,
        save_dir: &Path,
        log: &ProbeLog,
    ) -> CandidateOutcome {
        let locator = OutputLocator::new().expecting(expected).excluding(input);
        let mut last = CandidateOutcome {
            rc: RC_FAILURE,
            stdout: String::new(),
            stderr: String::new(),
            result: Err(EnhanceError::OutputNotLocatable(save_dir.to_path_buf())),
        };

        for form in &self.forms {
            let cmd = form.render(&self.context(input, expected, save_dir));
            info!(command = %cmd, "Trying candidate");
            log.append(format!("--- Attempting command: {}", cmd));

            let outcome = self.execute(&cmd);
            let attempt = self.classify(&cmd, &outcome, &locator, save_dir, log);
            let rc = match &attempt {
                Ok(_) => 0,
                Err(e) => e.response_code(),
            };

            last = CandidateOutcome {
                rc,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
                result: attempt,
            };
            if last.result.is_ok() {
                return last;
            }
        }

        last
    }

    fn classify(
        &self,
        cmd: &RenderedCommand,
        outcome: &CommandOutcome,
        locator: &OutputLocator,
        save_dir: &Path,
        log: &ProbeLog,
    ) -> Result<PathBuf> {
        if let Some(kind) = outcome.spawn_error {
            log.append(format!("Command not found or not runnable: {}", outcome.stderr));
            debug!(program = %cmd.program, ?kind, "Candidate could not start");
            return Err(if kind == ErrorKind::NotFound {
                EnhanceError::InvocationNotFound {
                    program: cmd.program.clone(),
                }
            } else {
                EnhanceError::InvocationFailed {
                    code: outcome.rc,
                    stderr: outcome.stderr.clone(),
                }
            });
        }

        log.record_command(outcome.rc, &outcome.stdout, &outcome.stderr);

        let search_dir = cmd.search_dir.as_deref().unwrap_or(save_dir);
        let located = match cmd.search_dir {
            Some(_) => locator.locate(search_dir),
            None => locator.locate_expected(),
        };

        match located {
            Some(path) => {
                if outcome.rc != 0 {
                    warn!(rc = outcome.rc, path = %path.display(), "Output located despite failure exit");
                    log.append(format!("Found produced file despite rc!=0: {}", path.display()));
                } else {
                    log.append(format!("Found produced file: {}", path.display()));
                }
                Ok(path)
            }
            None if outcome.rc == 0 => {
                log.append(format!("RC=0 but no output located in {}", search_dir.display()));
                Err(EnhanceError::OutputNotLocatable(search_dir.to_path_buf()))
            }
            None => Err(EnhanceError::InvocationFailed {
                code: outcome.rc,
                stderr: outcome.stderr.clone(),
            }),
        }
    }
}
