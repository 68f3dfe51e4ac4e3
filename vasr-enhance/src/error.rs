//! Error types for vasr-enhance
//!
//! Every step of the pipeline and of the fallback ladder reports one of these
//! kinds; the ladder decides per kind whether to try the next tier.

use std::path::PathBuf;
use thiserror::Error;
use vasr_common::protocol::{ServerResponse, RC_FAILURE, RC_INVALID_REQUEST, RC_NOT_FOUND};

/// Enhancement error taxonomy
#[derive(Debug, Error)]
pub enum EnhanceError {
    /// Request misses `input` or `output`
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// External program could not be found
    #[error("command not found: {program}")]
    InvocationNotFound { program: String },

    /// External program exited non-zero and produced nothing usable
    #[error("command failed with exit code {code}: {stderr}")]
    InvocationFailed { code: i32, stderr: String },

    /// Command reported success but no output file could be located
    #[error("no output located in {0}")]
    OutputNotLocatable(PathBuf),

    /// Device memory exhausted during model inference
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Model call failed for any other reason
    #[error("enhancement failed: {0}")]
    EnhancementFailure(String),

    /// Channel split or merge failed in the stereo fallback
    #[error("transcode failed: {0}")]
    TranscodeFailed(String),

    /// Audio decode/encode or configuration error from vasr-common
    #[error(transparent)]
    Audio(#[from] vasr_common::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnhanceError {
    /// Classify a model failure message
    ///
    /// Out-of-memory text from the accelerator runtime becomes
    /// [`EnhanceError::ResourceExhausted`]; everything else is an
    /// [`EnhanceError::EnhancementFailure`].
    pub fn from_model_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.to_lowercase().contains("out of memory") {
            EnhanceError::ResourceExhausted(message)
        } else {
            EnhanceError::EnhancementFailure(message)
        }
    }

    /// Response code reported to a server client
    pub fn response_code(&self) -> i32 {
        match self {
            EnhanceError::InvalidRequest(_) => RC_INVALID_REQUEST,
            EnhanceError::InvocationNotFound { .. } => RC_NOT_FOUND,
            EnhanceError::InvocationFailed { code, .. } if *code != 0 => *code,
            _ => RC_FAILURE,
        }
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, EnhanceError::ResourceExhausted(_))
    }
}

impl From<EnhanceError> for ServerResponse {
    fn from(err: EnhanceError) -> Self {
        ServerResponse::failure(err.response_code(), err.to_string())
    }
}

/// Result type for enhancement operations
pub type Result<T> = std::result::Result<T, EnhanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_is_resource_exhausted() {
        let err = EnhanceError::from_model_message("CUDA out of memory. Tried to allocate 2 GiB");
        assert!(err.is_resource_exhausted());

        let err = EnhanceError::from_model_message("RuntimeError: Out Of Memory");
        assert!(err.is_resource_exhausted());
    }

    #[test]
    fn test_other_messages_are_enhancement_failures() {
        let err = EnhanceError::from_model_message("shape mismatch");
        assert!(matches!(err, EnhanceError::EnhancementFailure(_)));
    }

    #[test]
    fn test_response_codes() {
        assert_eq!(EnhanceError::InvalidRequest("x".into()).response_code(), 5);
        assert_eq!(
            EnhanceError::InvocationNotFound { program: "audiosr".into() }.response_code(),
            127
        );
        assert_eq!(
            EnhanceError::InvocationFailed { code: 3, stderr: String::new() }.response_code(),
            3
        );
        assert_eq!(EnhanceError::TranscodeFailed("merge".into()).response_code(), 1);
    }

    #[test]
    fn test_into_response() {
        let response: ServerResponse = EnhanceError::InvalidRequest("missing output".into()).into();
        assert_eq!(response.rc, 5);
        assert!(response.stderr.contains("missing output"));
        assert!(response.stdout.is_empty());
    }
}
