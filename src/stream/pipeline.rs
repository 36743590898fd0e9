//! Producer/consumer pipeline over a raw RGB frame stream
//!
//! The calling thread is the only producer: it assembles frames, numbers them
//! in arrival order and pushes them onto a bounded queue. `thread_count`
//! workers pop items until each receives its own [`WorkItem::Shutdown`].
//! Outputs may complete out of index order; every path is addressed by index.

use super::pattern::OutputPattern;
use super::reader::{FrameRead, FrameReader, ReadPolicy};
use crate::{
    background::ColorMode,
    context::{ProcessingContext, RunSummary, SuccessCounter},
    error::{PipelineError, Result},
    tracing_config::{events, spans},
};
use crossbeam_channel::{bounded, Receiver};
use image::{DynamicImage, RgbImage};
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tracing::{debug, error, info};

/// Unit of work handed from the reader to a worker
#[derive(Debug)]
pub enum WorkItem {
    /// One full frame, owned by whichever worker dequeues it
    Frame { index: u64, pixels: Vec<u8> },
    /// Tells exactly one worker to exit
    Shutdown,
}

/// Stream driver for fixed-size RGB frames
pub struct StreamPipeline<'a> {
    ctx: &'a ProcessingContext,
    width: u32,
    height: u32,
    pattern: OutputPattern,
    policy: ReadPolicy,
}

impl<'a> StreamPipeline<'a> {
    pub fn new(
        ctx: &'a ProcessingContext,
        width: u32,
        height: u32,
        pattern: OutputPattern,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::config_value_error(
                "frame size",
                format!("{width}x{height}"),
                "positive width and height",
            ));
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(3))
            .ok_or_else(|| PipelineError::invalid_config("frame size overflows"))?;

        Ok(Self {
            ctx,
            width,
            height,
            pattern,
            policy: ReadPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bytes per frame: width * height * 3
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Consume `source` until it ends, then drain and join every worker
    pub fn run<R: Read>(&self, source: R) -> Result<RunSummary> {
        let threads = self.ctx.config().thread_count;

        if let Some(dir) = self.pattern.parent_dir() {
            std::fs::create_dir_all(&dir)
                .map_err(|e| PipelineError::file_io_error("create output directory", &dir, &e))?;
        }

        let mut reader = FrameReader::new(source, self.frame_size())?.with_policy(self.policy);

        // All frames share one size, so the background is adapted once up front
        let background =
            self.ctx
                .adapt_background_to((self.width, self.height), ColorMode::Rgb, None);

        let span = spans::stream(self.width, self.height, threads);
        let _enter = span.enter();
        info!(
            "🎞️ Reading {}x{} frames, writing to {} with {} worker(s)",
            self.width, self.height, self.pattern, threads
        );
        self.ctx.reporter().run_started(None);

        let (sender, receiver) = bounded::<WorkItem>(threads + 1);
        let successes = SuccessCounter::new();

        let (total, spawn_error) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(threads);
            let mut spawn_error = None;
            for worker_id in 0..threads {
                let receiver = receiver.clone();
                let background = background.as_ref();
                let successes = &successes;
                let spawned = thread::Builder::new()
                    .name(format!("stream-worker-{worker_id}"))
                    .spawn_scoped(scope, move || {
                        self.run_worker(worker_id, &receiver, background, successes)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        spawn_error = Some(PipelineError::internal(format!(
                            "failed to spawn worker: {e}"
                        )));
                        break;
                    },
                }
            }
            drop(receiver);

            let mut index: u64 = 0;
            if spawn_error.is_none() {
                while let FrameRead::Frame(pixels) = reader.read_frame() {
                    if sender.send(WorkItem::Frame { index, pixels }).is_err() {
                        error!("All stream workers exited early; stopping at frame {}", index);
                        break;
                    }
                    index += 1;
                }
            }

            for _ in 0..handles.len() {
                if sender.send(WorkItem::Shutdown).is_err() {
                    break;
                }
            }
            drop(sender);

            for handle in handles {
                if handle.join().is_err() {
                    error!("Stream worker panicked outside item processing");
                }
            }
            (index, spawn_error)
        });

        if let Some(e) = spawn_error {
            return Err(e);
        }

        let summary = RunSummary {
            total: usize::try_from(total).unwrap_or(usize::MAX),
            succeeded: successes.get()?,
        };
        info!(
            "✅ Stream ended: {} of {} frames successfully processed",
            summary.succeeded, summary.total
        );
        self.ctx.reporter().run_finished(&summary);
        Ok(summary)
    }

    fn run_worker(
        &self,
        worker_id: usize,
        receiver: &Receiver<WorkItem>,
        background: Option<&DynamicImage>,
        successes: &SuccessCounter,
    ) {
        let span = spans::worker(worker_id);
        let _enter = span.enter();
        debug!("Stream worker {} started", worker_id);

        let mut succeeded = 0;
        // A closed channel also ends the loop
        while let Ok(item) = receiver.recv() {
            let (index, pixels) = match item {
                WorkItem::Shutdown => break,
                WorkItem::Frame { index, pixels } => (index, pixels),
            };

            let label = format!("frame {index}");
            let item_span = spans::item(&label);
            let _item = item_span.enter();

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.process_frame(index, pixels, background)
            }))
            .unwrap_or_else(|payload| Err(PipelineError::from_panic(payload.as_ref())));

            let ok = match outcome {
                Ok(path) => {
                    succeeded += 1;
                    info!("{} => {}", label, path.display());
                    true
                },
                Err(e) => {
                    events::item_failed(&label, &e);
                    false
                },
            };
            self.ctx.reporter().item_finished(&label, ok);
        }

        if let Err(e) = successes.add(succeeded) {
            error!("Worker {} could not publish its tally: {}", worker_id, e);
        }
        events::worker_summary(worker_id, succeeded);
    }

    fn process_frame(
        &self,
        index: u64,
        pixels: Vec<u8>,
        background: Option<&DynamicImage>,
    ) -> Result<std::path::PathBuf> {
        let frame = RgbImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| PipelineError::stream(format!("frame {index} has the wrong size")))?;
        let image = DynamicImage::ImageRgb8(frame);
        let destination = self.pattern.format(index);
        self.ctx.process_image(&image, background, &destination)?;
        Ok(destination)
    }
}

/// Run a stream with the default read policy
pub fn run_stream<R: Read>(
    ctx: &ProcessingContext,
    width: u32,
    height: u32,
    pattern: OutputPattern,
    source: R,
) -> Result<RunSummary> {
    StreamPipeline::new(ctx, width, height, pattern)?.run(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputMode, PipelineConfig};
    use crate::mask::MaskProvider;
    use image::GrayImage;
    use std::io::Cursor;
    use std::sync::Arc;

    fn context(threads: usize, provider: Arc<dyn MaskProvider>) -> ProcessingContext {
        let config = PipelineConfig::builder()
            .output_mode(OutputMode::MaskOnly)
            .thread_count(threads)
            .build()
            .unwrap();
        ProcessingContext::with_background(config, provider, None)
    }

    #[test]
    fn test_zero_sized_frames_rejected() {
        let ctx = context(
            1,
            Arc::new(|_: &PipelineConfig, i: &DynamicImage| -> Result<GrayImage> {
                Ok(GrayImage::new(i.width(), i.height()))
            }),
        );
        let pattern = OutputPattern::parse("%d.png").unwrap();
        assert!(StreamPipeline::new(&ctx, 0, 4, pattern).is_err());
    }

    #[test]
    fn test_panicking_item_does_not_stop_the_pool() {
        let provider = Arc::new(|_: &PipelineConfig, image: &DynamicImage| -> Result<GrayImage> {
            let first = image.as_rgb8().map_or(0, |rgb| rgb.as_raw()[0]);
            assert!(first != 1, "poisoned frame");
            Ok(GrayImage::new(image.width(), image.height()))
        });
        let ctx = context(2, provider);
        let dir = tempfile::tempdir().unwrap();
        let pattern = OutputPattern::parse(&format!("{}/%03d.png", dir.path().display())).unwrap();

        // Four 1x1 frames; the second one panics inside the mask provider
        let data = vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3];
        let summary = StreamPipeline::new(&ctx, 1, 1, pattern)
            .unwrap()
            .with_read_policy(ReadPolicy::without_backoff())
            .run(Cursor::new(data))
            .unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 3);
        assert!(dir.path().join("000.png").exists());
        assert!(!dir.path().join("001.png").exists());
        assert!(dir.path().join("003.png").exists());
    }
}
