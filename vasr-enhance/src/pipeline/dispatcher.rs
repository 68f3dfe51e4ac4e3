//! Channel dispatch
//!
//! Chooses mono, stereo or downmix handling once per file and drives
//! planner → invoker → stitcher over each processed channel.

use crate::error::{EnhanceError, Result};
use crate::invoker::{EnhancementJob, SegmentInvoker};
use crate::model::{DiffusionParams, SuperResolutionModel};
use crate::pipeline::planner::SegmentPlanner;
use crate::pipeline::stitcher::{expected_output_len, pair_channels, SegmentStitcher};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use vasr_common::audio::{read_audio, write_wav};
use vasr_common::{AudioBuffer, TARGET_SAMPLE_RATE};

/// Channel handling selected from the input's channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// One channel, processed directly
    Mono,
    /// Exactly two channels, processed independently then paired
    Stereo,
    /// More than two channels, averaged to mono first
    Multichannel(usize),
}

impl ChannelMode {
    pub fn for_channel_count(count: usize) -> Result<Self> {
        match count {
            0 => Err(EnhanceError::Audio(vasr_common::Error::InvalidInput(
                "input has no channels".into(),
            ))),
            1 => Ok(ChannelMode::Mono),
            2 => Ok(ChannelMode::Stereo),
            n => Ok(ChannelMode::Multichannel(n)),
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Mono => write!(f, "mono"),
            ChannelMode::Stereo => write!(f, "stereo"),
            ChannelMode::Multichannel(n) => write!(f, "{}-channel mixdown", n),
        }
    }
}

/// Summary of one enhanced file
#[derive(Debug, Clone)]
pub struct EnhanceReport {
    pub mode: ChannelMode,
    pub input_rate: u32,
    pub input_frames: usize,
    pub output_frames: usize,
    pub segments: usize,
    pub elapsed: Duration,
}

impl fmt::Display for EnhanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} frames @ {} Hz -> {} frames @ {} Hz in {} segment(s), {:.1}s",
            self.mode,
            self.input_frames,
            self.input_rate,
            self.output_frames,
            TARGET_SAMPLE_RATE,
            self.segments,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Drives the segmented pipeline against a shared model
pub struct ChannelDispatcher {
    model: Arc<dyn SuperResolutionModel>,
    params: DiffusionParams,
    chunk_duration: f64,
    scratch_dir: PathBuf,
}

impl ChannelDispatcher {
    pub fn new(model: Arc<dyn SuperResolutionModel>, params: DiffusionParams, chunk_duration: f64) -> Self {
        Self {
            model,
            params,
            chunk_duration,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Directory for per-segment temporary files (system temp by default)
    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn chunk_duration(&self) -> f64 {
        self.chunk_duration
    }

    /// Read `input`, enhance it and write a 48 kHz WAV to `output`
    pub fn enhance_file(&self, input: &Path, output: &Path) -> Result<EnhanceReport> {
        let started = Instant::now();
        info!(input = %input.display(), "Reading audio");
        let buffer = read_audio(input)?;
        let mode = ChannelMode::for_channel_count(buffer.channel_count())?;
        let input_rate = buffer.sample_rate();
        let input_frames = buffer.frames();
        let segments = SegmentPlanner::new(self.chunk_duration, input_rate)?
            .plan(input_frames)
            .len();

        info!(
            mode = %mode,
            seconds = buffer.duration_seconds(),
            chunk_seconds = self.chunk_duration,
            "Processing"
        );
        let job = EnhancementJob::new(input, output, "mono");
        let enhanced = self.enhance_buffer(&job, buffer)?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!(output = %output.display(), "Writing high-resolution audio");
        write_wav(output, &enhanced)?;

        let channel_segments = match mode {
            ChannelMode::Stereo => segments * 2,
            _ => segments,
        };
        Ok(EnhanceReport {
            mode,
            input_rate,
            input_frames,
            output_frames: enhanced.frames(),
            segments: channel_segments,
            elapsed: started.elapsed(),
        })
    }

    /// Enhance an in-memory buffer; the result is always at 48 kHz
    pub fn enhance_buffer(&self, job: &EnhancementJob, buffer: AudioBuffer) -> Result<AudioBuffer> {
        let sample_rate = buffer.sample_rate();
        let mode = ChannelMode::for_channel_count(buffer.channel_count())?;

        match mode {
            ChannelMode::Mono => {
                let mono = buffer.into_channels().remove(0);
                let out = self.process_channel(&job.for_channel("mono"), &mono, sample_rate)?;
                Ok(AudioBuffer::mono(out, TARGET_SAMPLE_RATE)?)
            }
            ChannelMode::Stereo => {
                let mut channels = buffer.into_channels();
                let right = channels.pop().unwrap_or_default();
                let left = channels.pop().unwrap_or_default();
                drop(channels);

                let enhanced_left = self.process_channel(&job.for_channel("left"), &left, sample_rate)?;
                drop(left);
                self.model.reclaim_memory();

                let enhanced_right =
                    self.process_channel(&job.for_channel("right"), &right, sample_rate)?;
                drop(right);

                let (left, right) = pair_channels(enhanced_left, enhanced_right);
                Ok(AudioBuffer::stereo(left, right, TARGET_SAMPLE_RATE)?)
            }
            ChannelMode::Multichannel(_) => {
                let mixed = buffer.downmix();
                drop(buffer);
                let out = self.process_channel(&job.for_channel("mix"), &mixed, sample_rate)?;
                Ok(AudioBuffer::mono(out, TARGET_SAMPLE_RATE)?)
            }
        }
    }

    /// Enhance one channel segment by segment, strictly in order
    pub fn process_channel(&self, job: &EnhancementJob, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        let planner = SegmentPlanner::new(self.chunk_duration, sample_rate)?;
        let total = samples.len();
        if total == 0 {
            info!(channel = %job.channel_label, "Channel is empty, skipping");
            return Ok(Vec::new());
        }

        info!(
            channel = %job.channel_label,
            seconds = %format!("{:.1}", total as f64 / sample_rate as f64),
            "Processing channel"
        );

        let invoker = SegmentInvoker::new(self.model.as_ref(), self.params, &self.scratch_dir);
        let mut stitcher = SegmentStitcher::with_capacity(expected_output_len(total, sample_rate));

        for segment in planner.plan(total) {
            let offset_seconds = segment.start as f64 / sample_rate as f64;
            let percent = segment.start * 100 / total;
            info!(
                channel = %job.channel_label,
                percent,
                offset = %format!("{:.1}s", offset_seconds),
                "Segment {}",
                segment.index
            );
            let result = invoker.invoke(job, &segment, samples, sample_rate)?;
            stitcher.push(result)?;
        }

        Ok(stitcher.finish())
    }
}
