//! Shared test helpers
#![allow(dead_code)]

pub mod audio_generator;
pub mod fake_tools;
pub mod stub_model;
