//! Raw RGB frame stream mode
//!
//! Headerless, back-to-back `width * height * 3` byte frames are read from a
//! byte source (normally stdin), composited by a worker pool and written to
//! paths derived from each frame's index.

pub mod pattern;
pub mod pipeline;
pub mod reader;

pub use pattern::OutputPattern;
pub use pipeline::{run_stream, StreamPipeline, WorkItem};
pub use reader::{
    FrameRead, FrameReader, ReadPolicy, EMPTY_READ_BACKOFF, MAX_CONSECUTIVE_EMPTY_READS,
};
