//! vasr-enhance - Audio super-resolution orchestrator
//!
//! Upsamples low-resolution audio to 48 kHz by driving an external model.
//! Long inputs are cut into fixed-duration segments so memory stays bounded;
//! each segment is enhanced inside a reclamation bracket and the results are
//! stitched back together per channel.
//!
//! Two enhancement paths exist:
//! - in-process: [`pipeline::ChannelDispatcher`] over a loaded
//!   [`model::SuperResolutionModel`]
//! - out-of-process: [`external::FallbackLadder`] and [`external::Wrapper`]
//!   around a command-line tool whose flags and output location vary
//!
//! [`server::RequestServer`] exposes either path as a line-JSON TCP service
//! so the model is loaded once rather than per file.

pub mod config;
pub mod error;
pub mod external;
pub mod invoker;
pub mod locator;
pub mod model;
pub mod pipeline;
pub mod server;

pub use error::{EnhanceError, Result};
pub use invoker::{EnhancementJob, SegmentInvoker};
pub use locator::OutputLocator;
pub use model::{DiffusionParams, SuperResolutionModel, WorkerModel};
pub use pipeline::{ChannelDispatcher, ChannelMode, EnhanceReport};
pub use server::{Backend, RequestServer, ServerClient, ServerContext};
