//! Segment stitching
//!
//! The model's output length is not trusted: every segment result is coerced
//! to exactly the sample count its input duration maps to at the target rate,
//! so segment boundaries land on the same grid for every channel.

use crate::error::{EnhanceError, Result};
use vasr_common::TARGET_SAMPLE_RATE;

/// `⌊input_len / source_rate × 48000⌋`, computed without float rounding
pub fn expected_output_len(input_len: usize, source_rate: u32) -> usize {
    if source_rate == 0 {
        return 0;
    }
    ((input_len as u128 * TARGET_SAMPLE_RATE as u128) / source_rate as u128) as usize
}

/// Truncate trailing samples or zero-pad to `expected`
pub fn coerce_length(mut samples: Vec<f32>, expected: usize) -> Vec<f32> {
    samples.resize(expected, 0.0);
    samples
}

/// Model output for one segment plus the length it must have
#[derive(Debug, Clone)]
pub struct SegmentResult {
    pub index: usize,
    pub samples: Vec<f32>,
    pub expected_len: usize,
}

impl SegmentResult {
    pub fn new(index: usize, samples: Vec<f32>, expected_len: usize) -> Self {
        Self {
            index,
            samples,
            expected_len,
        }
    }

    /// Samples coerced to `expected_len`
    pub fn into_coerced(self) -> Vec<f32> {
        coerce_length(self.samples, self.expected_len)
    }
}

/// Concatenates segment results of one channel in segment order
#[derive(Debug, Default)]
pub struct SegmentStitcher {
    output: Vec<f32>,
    next_index: usize,
}

impl SegmentStitcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stitcher with room for `capacity` output samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            output: Vec::with_capacity(capacity),
            next_index: 0,
        }
    }

    /// Append the next segment; results must arrive in segment order
    pub fn push(&mut self, result: SegmentResult) -> Result<()> {
        if result.index != self.next_index {
            return Err(EnhanceError::EnhancementFailure(format!(
                "segment {} arrived out of order, expected {}",
                result.index, self.next_index
            )));
        }
        let coerced = result.into_coerced();
        self.output.extend_from_slice(&coerced);
        self.next_index += 1;
        Ok(())
    }

    pub fn segments_stitched(&self) -> usize {
        self.next_index
    }

    pub fn len(&self) -> usize {
        self.output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }

    pub fn finish(self) -> Vec<f32> {
        self.output
    }
}

/// Truncate both channels to the shorter length
pub fn pair_channels(mut left: Vec<f32>, mut right: Vec<f32>) -> (Vec<f32>, Vec<f32>) {
    let len = left.len().min(right.len());
    left.truncate(len);
    right.truncate(len);
    (left, right)
}
