//! Fixed-size frame assembly from a raw byte source
//!
//! Pipes deliver data in arbitrary chunks and may briefly run dry. The reader
//! keeps appending until a whole frame is buffered, backing off on empty reads,
//! and gives up after a bounded run of consecutive empty reads.

use crate::error::{PipelineError, Result};
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Consecutive empty reads tolerated before the stream counts as ended
pub const MAX_CONSECUTIVE_EMPTY_READS: u32 = 6;

/// Pause between consecutive empty reads
pub const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(500);

/// Retry policy for empty reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    /// Consecutive empty reads that end the stream
    pub max_empty_reads: u32,
    /// Sleep after each empty read below the bound
    pub backoff: Duration,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            max_empty_reads: MAX_CONSECUTIVE_EMPTY_READS,
            backoff: EMPTY_READ_BACKOFF,
        }
    }
}

impl ReadPolicy {
    /// Same bound, no sleeping
    #[must_use]
    pub fn without_backoff() -> Self {
        Self {
            backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Result of one frame read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// Exactly `frame_size` bytes
    Frame(Vec<u8>),
    /// No further complete frame; any partial bytes were discarded
    EndOfStream,
}

/// Assembles frames of exactly `frame_size` bytes from `source`
pub struct FrameReader<R: Read> {
    source: R,
    frame_size: usize,
    policy: ReadPolicy,
    frames_read: u64,
    finished: bool,
}

impl<R: Read> FrameReader<R> {
    pub fn new(source: R, frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(PipelineError::invalid_config("frame size must be positive"));
        }
        Ok(Self {
            source,
            frame_size,
            policy: ReadPolicy::default(),
            frames_read: 0,
            finished: false,
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReadPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Complete frames returned so far
    #[must_use]
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Read the next full frame or report end of stream
    ///
    /// Once end of stream is reported every later call reports it again
    /// without touching the source.
    pub fn read_frame(&mut self) -> FrameRead {
        if self.finished {
            return FrameRead::EndOfStream;
        }

        let mut buffer = vec![0u8; self.frame_size];
        let mut offset = 0;
        let mut empty_reads = 0;

        while offset < self.frame_size {
            match self.source.read(&mut buffer[offset..]) {
                Ok(0) => {},
                Ok(n) => {
                    offset += n;
                    empty_reads = 0;
                    continue;
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {},
                Err(e) => {
                    warn!("Input stream failed after {} frames: {}", self.frames_read, e);
                    return self.finish(offset);
                },
            }

            empty_reads += 1;
            if empty_reads >= self.policy.max_empty_reads {
                return self.finish(offset);
            }
            if !self.policy.backoff.is_zero() {
                thread::sleep(self.policy.backoff);
            }
        }

        self.frames_read += 1;
        FrameRead::Frame(buffer)
    }

    fn finish(&mut self, partial: usize) -> FrameRead {
        self.finished = true;
        if partial > 0 {
            warn!(
                "Discarding {} trailing bytes of an incomplete {}-byte frame",
                partial, self.frame_size
            );
        }
        debug!("End of stream after {} frames", self.frames_read);
        FrameRead::EndOfStream
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_frame() {
            FrameRead::Frame(frame) => Some(frame),
            FrameRead::EndOfStream => None,
        }
    }
}
