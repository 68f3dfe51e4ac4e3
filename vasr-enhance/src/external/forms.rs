//! Candidate command forms
//!
//! The enhancement tool's command-line surface differs between versions, so
//! each known invocation shape is a [`CommandForm`] value. Supporting a new
//! version means appending a form (in code or via `[[cli.forms]]` in TOML).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Program placeholder replaced by the configured Python interpreter
pub const PYTHON_PLACEHOLDER: &str = "{python}";

/// Where a form is expected to leave its product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputHint {
    /// Somewhere under the save directory (name chosen by the tool)
    #[default]
    SaveDir,
    /// Exactly at `{output}`
    Exact,
}

/// One invocation shape: program, argument template and output hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandForm {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub output_hint: OutputHint,
}

impl CommandForm {
    pub fn new(program: &str, args: &[&str], output_hint: OutputHint) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            output_hint,
        }
    }

    /// Substitute placeholders for one concrete invocation
    pub fn render(&self, ctx: &FormContext<'_>) -> RenderedCommand {
        let program = if self.program == PYTHON_PLACEHOLDER {
            ctx.python.to_string()
        } else {
            ctx.substitute(&self.program)
        };
        let args = self.args.iter().map(|a| ctx.substitute(a)).collect();
        let search_dir = match self.output_hint {
            OutputHint::SaveDir => Some(ctx.save_dir.to_path_buf()),
            OutputHint::Exact => None,
        };
        RenderedCommand {
            program,
            args,
            search_dir,
        }
    }
}

/// Values available to placeholders
#[derive(Debug, Clone)]
pub struct FormContext<'a> {
    pub python: &'a str,
    pub input: &'a Path,
    pub output: &'a Path,
    pub save_dir: &'a Path,
    pub device: &'a str,
    pub model: &'a str,
}

impl FormContext<'_> {
    fn substitute(&self, template: &str) -> String {
        template
            .replace("{python}", self.python)
            .replace("{input}", &self.input.to_string_lossy())
            .replace("{output}", &self.output.to_string_lossy())
            .replace("{save_dir}", &self.save_dir.to_string_lossy())
            .replace("{device}", self.device)
            .replace("{model}", self.model)
    }
}

/// A form with every placeholder filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Directory to search when the product path is not fixed
    pub search_dir: Option<PathBuf>,
}

impl fmt::Display for RenderedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Forms tried by the request server, in order
pub fn server_forms() -> Vec<CommandForm> {
    use OutputHint::SaveDir;
    vec![
        CommandForm::new(
            PYTHON_PLACEHOLDER,
            &["-m", "audiosr", "enhance", "-i", "{input}", "-s", "{save_dir}", "-d", "{device}"],
            SaveDir,
        ),
        CommandForm::new(
            PYTHON_PLACEHOLDER,
            &["-m", "audiosr", "-i", "{input}", "-s", "{save_dir}", "-d", "{device}"],
            SaveDir,
        ),
        CommandForm::new(
            "audiosr",
            &["-i", "{input}", "-s", "{save_dir}", "-d", "{device}"],
            SaveDir,
        ),
    ]
}

/// Forms tried by single-run wrapper mode, in order
pub fn wrapper_forms() -> Vec<CommandForm> {
    use OutputHint::{Exact, SaveDir};
    vec![
        CommandForm::new(
            PYTHON_PLACEHOLDER,
            &[
                "-m", "audiosr", "-i", "{input}", "-s", "{save_dir}", "--model_name", "{model}",
                "--device", "{device}",
            ],
            SaveDir,
        ),
        CommandForm::new(
            PYTHON_PLACEHOLDER,
            &[
                "-m", "audiosr", "enhance", "--input_audio_file", "{input}", "--output", "{output}",
                "--device", "{device}",
            ],
            Exact,
        ),
        CommandForm::new(
            PYTHON_PLACEHOLDER,
            &[
                "-m", "audiosr", "enhance", "-i", "{input}", "-s", "{save_dir}", "--model_name",
                "{model}", "--device", "{device}",
            ],
            SaveDir,
        ),
        CommandForm::new(
            "audiosr",
            &["--input_audio_file", "{input}", "--save_path", "{save_dir}", "--device", "{device}"],
            SaveDir,
        ),
        CommandForm::new(
            "audiosr",
            &["-i", "{input}", "-s", "{save_dir}", "--device", "{device}"],
            SaveDir,
        ),
    ]
}
