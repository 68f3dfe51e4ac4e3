//! # vasr Common Library
//!
//! Shared code for the vasr enhancement service:
//! - Error type used across crates
//! - TOML/environment configuration loading
//! - Audio buffer model with decode (symphonia) and encode (hound)
//! - Wire protocol of the request server

pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;

pub use audio::{AudioBuffer, TARGET_SAMPLE_RATE};
pub use error::{Error, Result};
pub use protocol::{ServerRequest, ServerResponse};
