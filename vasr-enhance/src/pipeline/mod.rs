//! Chunked processing pipeline: plan → invoke → stitch, per channel

pub mod dispatcher;
pub mod planner;
pub mod stitcher;

pub use dispatcher::{ChannelDispatcher, ChannelMode, EnhanceReport};
pub use planner::{Segment, SegmentPlanner};
pub use stitcher::{SegmentResult, SegmentStitcher};
