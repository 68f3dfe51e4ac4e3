//! Stand-in models for pipeline tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use vasr_common::audio::read_audio;
use vasr_common::TARGET_SAMPLE_RATE;
use vasr_enhance::error::{EnhanceError, Result};
use vasr_enhance::model::{DiffusionParams, SuperResolutionModel};

/// What the stub returns per call
#[derive(Debug, Clone)]
pub enum StubBehavior {
    /// Nearest-neighbour upsample of the segment to 48 kHz
    Upsample,
    /// A waveform of fixed length regardless of input
    FixedLength(usize),
    /// Fail with the given model message
    Fail(String),
}

/// Records every call and every reclamation
pub struct StubModel {
    behavior: StubBehavior,
    calls: AtomicUsize,
    reclaims: AtomicUsize,
    /// (path, existed at call time)
    seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl StubModel {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            reclaims: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn upsampling() -> Self {
        Self::new(StubBehavior::Upsample)
    }

    pub fn out_of_memory() -> Self {
        Self::new(StubBehavior::Fail("CUDA out of memory. Tried to allocate 1.00 GiB".into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reclaims(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<(PathBuf, bool)> {
        self.seen.lock().unwrap().clone()
    }
}

impl SuperResolutionModel for StubModel {
    fn super_resolution(&self, input: &Path, _params: &DiffusionParams) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((input.to_path_buf(), input.is_file()));

        match &self.behavior {
            StubBehavior::Fail(message) => Err(EnhanceError::from_model_message(message.clone())),
            StubBehavior::FixedLength(len) => Ok(vec![0.1; *len]),
            StubBehavior::Upsample => {
                let buffer = read_audio(input)?;
                let samples = buffer.channel(0).unwrap_or(&[]).to_vec();
                let rate = buffer.sample_rate() as u64;
                let out_len = (samples.len() as u64 * TARGET_SAMPLE_RATE as u64 / rate) as usize;
                Ok((0..out_len)
                    .map(|i| samples[(i as u64 * rate / TARGET_SAMPLE_RATE as u64) as usize])
                    .collect())
            }
        }
    }

    fn reclaim_memory(&self) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
    }
}
