//! Segment planning
//!
//! Splits one channel into fixed-duration, non-overlapping time segments so
//! that each model call sees a bounded amount of audio.

use crate::error::{EnhanceError, Result};

/// Contiguous `[start, end)` slice of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Position in the channel's segment sequence
    pub index: usize,
    /// First sample (inclusive)
    pub start: usize,
    /// Last sample (exclusive)
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Borrow this segment's samples out of the channel
    pub fn slice<'a>(&self, channel: &'a [f32]) -> &'a [f32] {
        &channel[self.start..self.end]
    }
}

/// Divides a channel into segments of `⌊duration · sample_rate⌋` samples
#[derive(Debug, Clone, Copy)]
pub struct SegmentPlanner {
    chunk_samples: usize,
}

impl SegmentPlanner {
    /// Planner for a chunk duration in seconds at the given source rate
    ///
    /// Durations shorter than one sample still produce one-sample segments.
    pub fn new(chunk_duration: f64, sample_rate: u32) -> Result<Self> {
        if !chunk_duration.is_finite() || chunk_duration <= 0.0 {
            return Err(EnhanceError::Audio(vasr_common::Error::InvalidInput(format!(
                "chunk duration must be a positive number of seconds, got {}",
                chunk_duration
            ))));
        }
        if sample_rate == 0 {
            return Err(EnhanceError::Audio(vasr_common::Error::InvalidInput(
                "sample rate must be non-zero".into(),
            )));
        }
        let chunk_samples = (chunk_duration * sample_rate as f64).floor() as usize;
        Ok(Self {
            chunk_samples: chunk_samples.max(1),
        })
    }

    pub fn chunk_samples(&self) -> usize {
        self.chunk_samples
    }

    /// Lazy, ordered segment sequence covering `total_samples`
    ///
    /// Empty for `total_samples == 0`; a single segment when the chunk is at
    /// least as long as the channel.
    pub fn plan(&self, total_samples: usize) -> Segments {
        Segments {
            next_start: 0,
            next_index: 0,
            total: total_samples,
            chunk: self.chunk_samples,
        }
    }
}

/// Iterator returned by [`SegmentPlanner::plan`]
#[derive(Debug, Clone)]
pub struct Segments {
    next_start: usize,
    next_index: usize,
    total: usize,
    chunk: usize,
}

impl Iterator for Segments {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.next_start >= self.total {
            return None;
        }
        let start = self.next_start;
        let end = start.saturating_add(self.chunk).min(self.total);
        let segment = Segment {
            index: self.next_index,
            start,
            end,
        };
        self.next_start = end;
        self.next_index += 1;
        Some(segment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total.saturating_sub(self.next_start);
        let count = remaining.div_ceil(self.chunk);
        (count, Some(count))
    }
}

impl ExactSizeIterator for Segments {}
