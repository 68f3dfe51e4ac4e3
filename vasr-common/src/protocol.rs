//! Wire protocol of the request server
//!
//! One JSON object per line, one request per TCP connection:
//!
//! ```text
//! -> {"input": "/music/in.wav", "output": "/music/out.wav"}
//! <- {"rc": 0, "stdout": "...", "stderr": "..."}
//! ```

use serde::{Deserialize, Serialize};

/// Success
pub const RC_SUCCESS: i32 = 0;
/// Generic invocation failure
pub const RC_FAILURE: i32 = 1;
/// Request is malformed or misses a field
pub const RC_INVALID_REQUEST: i32 = 5;
/// Internal exception while parsing or dispatching
pub const RC_INTERNAL: i32 = 6;
/// Copy-only mode could not copy
pub const RC_COPY_FAILED: i32 = 7;
/// Enhancement explicitly disabled
pub const RC_DISABLED: i32 = 9;
/// External program not found
pub const RC_NOT_FOUND: i32 = 127;

/// Request line sent by a client
///
/// Both fields are optional on the wire so that a missing field can be
/// answered with [`RC_INVALID_REQUEST`] instead of a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ServerRequest {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            output: Some(output.into()),
        }
    }

    /// Both paths, if present and non-empty
    pub fn paths(&self) -> Option<(&str, &str)> {
        let input = self.input.as_deref().filter(|s| !s.is_empty())?;
        let output = self.output.as_deref().filter(|s| !s.is_empty())?;
        Some((input, output))
    }
}

/// Response line returned to the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse {
    pub rc: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl ServerResponse {
    pub fn new(rc: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            rc,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(stdout: impl Into<String>) -> Self {
        Self::new(RC_SUCCESS, stdout, "")
    }

    pub fn failure(rc: i32, stderr: impl Into<String>) -> Self {
        Self::new(rc, "", stderr)
    }

    pub fn is_success(&self) -> bool {
        self.rc == RC_SUCCESS
    }
}
