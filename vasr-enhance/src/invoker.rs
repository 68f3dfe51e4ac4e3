//! In-process enhancement invoker
//!
//! Each segment call is wrapped in a reclamation bracket: memory is reclaimed
//! and the segment's temporary file is written on entry; on exit (success,
//! error or unwind) the file is deleted and memory is reclaimed again.

use crate::error::Result;
use crate::model::{DiffusionParams, SuperResolutionModel};
use crate::pipeline::planner::Segment;
use crate::pipeline::stitcher::{expected_output_len, SegmentResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use vasr_common::audio::write_wav;
use vasr_common::AudioBuffer;

/// One channel of one file being enhanced
#[derive(Debug, Clone)]
pub struct EnhancementJob {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub channel_label: String,
}

impl EnhancementJob {
    pub fn new(input_path: &Path, output_path: &Path, channel_label: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            input_path: input_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            channel_label: channel_label.to_string(),
        }
    }

    /// Same file, another channel
    pub fn for_channel(&self, channel_label: &str) -> Self {
        Self::new(&self.input_path, &self.output_path, channel_label)
    }

    /// Temporary file for the segment starting at `offset`
    ///
    /// Keyed by job id, channel label and offset so concurrent channels and
    /// requests never share a file.
    pub fn segment_path(&self, scratch_dir: &Path, offset: usize) -> PathBuf {
        scratch_dir.join(format!(
            "vasr_chunk_{}_{}_{}.wav",
            self.id.simple(),
            self.channel_label,
            offset
        ))
    }
}

/// Reclamation bracket around one segment invocation
struct SegmentBracket<'a> {
    model: &'a dyn SuperResolutionModel,
    path: PathBuf,
}

impl<'a> SegmentBracket<'a> {
    /// Reclaim, then write the segment to its temporary file
    fn open(
        model: &'a dyn SuperResolutionModel,
        path: PathBuf,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Self> {
        model.reclaim_memory();
        let bracket = Self { model, path };
        let buffer = AudioBuffer::mono(samples.to_vec(), sample_rate)?;
        write_wav(&bracket.path, &buffer)?;
        Ok(bracket)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SegmentBracket<'_> {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove segment file"),
        }
        self.model.reclaim_memory();
    }
}

/// Runs one segment at a time through a shared model
pub struct SegmentInvoker<'a> {
    model: &'a dyn SuperResolutionModel,
    params: DiffusionParams,
    scratch_dir: &'a Path,
}

impl<'a> SegmentInvoker<'a> {
    pub fn new(
        model: &'a dyn SuperResolutionModel,
        params: DiffusionParams,
        scratch_dir: &'a Path,
    ) -> Self {
        Self {
            model,
            params,
            scratch_dir,
        }
    }

    /// Enhance one segment of a channel
    ///
    /// `samples` is the whole channel; only `segment`'s slice is written out.
    /// The returned result carries the raw model output plus the length the
    /// stitcher will coerce it to.
    pub fn invoke(
        &self,
        job: &EnhancementJob,
        segment: &Segment,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<SegmentResult> {
        let expected_len = expected_output_len(segment.len(), sample_rate);
        let path = job.segment_path(self.scratch_dir, segment.start);

        let bracket = SegmentBracket::open(self.model, path, segment.slice(samples), sample_rate)?;
        let waveform = self.model.super_resolution(bracket.path(), &self.params)?;
        drop(bracket);

        debug!(
            channel = %job.channel_label,
            segment = segment.index,
            produced = waveform.len(),
            expected = expected_len,
            "Segment enhanced"
        );

        Ok(SegmentResult::new(segment.index, waveform, expected_len))
    }
}
