//! Directory and single-file drivers
//!
//! Directory mode splits the sorted entry list into contiguous slices, one per
//! worker thread. Each worker walks its slice sequentially, carrying its own
//! adapted background from item to item, and publishes its success tally to
//! the run's counter once when the slice is exhausted. A panic while handling
//! one entry is caught and counted as that entry's failure.

use crate::{
    context::{ProcessingContext, RunSummary, SuccessCounter},
    error::{PipelineError, Result},
    services::ImageIOService,
    tracing_config::{events, spans},
};
use image::DynamicImage;
use std::ffi::OsString;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, error, info};

/// Split `[0, file_count)` into contiguous near-equal slices
///
/// Uses `min(thread_count, file_count)` slices; boundary `i` is
/// `file_count * i / slices`. Returns no slices when either count is zero.
#[must_use]
pub fn partition(file_count: usize, thread_count: usize) -> Vec<Range<usize>> {
    let slices = thread_count.min(file_count);
    if slices == 0 {
        return Vec::new();
    }
    (0..slices)
        .map(|i| file_count * i / slices..file_count * (i + 1) / slices)
        .collect()
}

/// Output file name for an input entry: same stem, `.png` extension
#[must_use]
pub fn output_file_name(input_name: &OsString) -> PathBuf {
    Path::new(input_name).with_extension("png")
}

/// Process every entry of `input_dir` into `output_dir`
///
/// Only the creation of `output_dir` and the listing of `input_dir` are
/// fatal. Per-item failures are logged and counted as unsuccessful.
pub fn run_directory<P: AsRef<Path>, Q: AsRef<Path>>(
    ctx: &ProcessingContext,
    input_dir: P,
    output_dir: Q,
) -> Result<RunSummary> {
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir.as_ref();

    std::fs::create_dir_all(output_dir)
        .map_err(|e| PipelineError::file_io_error("create output directory", output_dir, &e))?;

    let entries = list_entries(input_dir, ctx.config().file_pattern.as_deref())?;
    let slices = partition(entries.len(), ctx.config().thread_count);

    let span = spans::directory_batch(input_dir, entries.len(), slices.len());
    let _enter = span.enter();
    info!(
        "📁 Processing {} entries from {} with {} worker(s)",
        entries.len(),
        input_dir.display(),
        slices.len()
    );
    ctx.reporter().run_started(Some(entries.len()));

    let successes = SuccessCounter::new();
    let attempted = thread::scope(|scope| -> Result<usize> {
        let mut handles = Vec::with_capacity(slices.len());
        for (worker_id, range) in slices.iter().cloned().enumerate() {
            let slice = entries.get(range).unwrap_or_default();
            let successes = &successes;
            let handle = thread::Builder::new()
                .name(format!("dir-worker-{worker_id}"))
                .spawn_scoped(scope, move || {
                    run_slice(ctx, successes, worker_id, slice, input_dir, output_dir)
                })
                .map_err(|e| PipelineError::internal(format!("failed to spawn worker: {e}")))?;
            handles.push(handle);
        }

        let mut attempted = 0;
        for handle in handles {
            match handle.join() {
                Ok(count) => attempted += count,
                Err(_) => error!("Directory worker panicked; its slice is incomplete"),
            }
        }
        Ok(attempted)
    })?;

    let summary = RunSummary {
        total: attempted,
        succeeded: successes.get()?,
    };
    info!(
        "✅ Total files successfully processed: {} of {}",
        summary.succeeded, summary.total
    );
    ctx.reporter().run_finished(&summary);
    Ok(summary)
}

/// Composite a single file without any worker threads
pub fn process_file<P: AsRef<Path>, Q: AsRef<Path>>(
    ctx: &ProcessingContext,
    input: P,
    output: Q,
) -> Result<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    let image = ImageIOService::load_image(input)?;
    let background = ctx.adapt_background_for(&image, None);
    ctx.process_image(&image, background.as_ref(), output)?;

    info!("✅ {} => {}", input.display(), output.display());
    Ok(())
}

/// Directory entry names, optionally glob-filtered, sorted
fn list_entries(input_dir: &Path, pattern: Option<&str>) -> Result<Vec<OsString>> {
    let pattern = pattern
        .map(glob::Pattern::new)
        .transpose()
        .map_err(|e| PipelineError::invalid_config(format!("invalid file pattern: {e}")))?;

    let read_dir = std::fs::read_dir(input_dir)
        .map_err(|e| PipelineError::file_io_error("read input directory", input_dir, &e))?;

    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry
            .map_err(|e| PipelineError::file_io_error("read input directory", input_dir, &e))?;
        let name = entry.file_name();
        if let Some(pattern) = &pattern {
            if !pattern.matches(&name.to_string_lossy()) {
                continue;
            }
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Walk one slice; returns the number of regular files attempted
fn run_slice(
    ctx: &ProcessingContext,
    successes: &SuccessCounter,
    worker_id: usize,
    slice: &[OsString],
    input_dir: &Path,
    output_dir: &Path,
) -> usize {
    let span = spans::worker(worker_id);
    let _enter = span.enter();
    debug!("Worker {} starting on {} entries", worker_id, slice.len());

    let mut cached: Option<DynamicImage> = None;
    let mut attempted = 0;
    let mut succeeded = 0;

    for name in slice {
        let input = input_dir.join(name);
        if !input.is_file() {
            debug!("Skipping non-regular entry {}", input.display());
            continue;
        }
        attempted += 1;

        let label = name.to_string_lossy();
        let item_span = spans::item(&label);
        let _item = item_span.enter();

        let output = output_dir.join(output_file_name(name));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            ImageIOService::load_image(&input).and_then(|image| {
                cached = ctx.adapt_background_for(&image, cached.take());
                ctx.process_image(&image, cached.as_ref(), &output)
            })
        }))
        .unwrap_or_else(|payload| Err(PipelineError::from_panic(payload.as_ref())));

        let ok = match outcome {
            Ok(()) => {
                succeeded += 1;
                info!("{} => {}", input.display(), output.display());
                true
            },
            Err(e) => {
                events::item_failed(&label, &e);
                false
            },
        };
        ctx.reporter().item_finished(&label, ok);
    }

    if let Err(e) = successes.add(succeeded) {
        error!("Worker {} could not publish its tally: {}", worker_id, e);
    }
    events::worker_summary(worker_id, succeeded);
    attempted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_range_exactly_once() {
        for file_count in 0..40 {
            for thread_count in 1..12 {
                let slices = partition(file_count, thread_count);
                assert_eq!(slices.len(), thread_count.min(file_count));

                let mut next = 0;
                for slice in &slices {
                    assert_eq!(slice.start, next);
                    assert!(slice.end > slice.start);
                    next = slice.end;
                }
                assert_eq!(next, file_count);
            }
        }
    }

    #[test]
    fn test_partition_is_near_equal() {
        let slices = partition(10, 3);
        assert_eq!(slices, vec![0..3, 3..6, 6..10]);
    }

    #[test]
    fn test_partition_degenerate_counts() {
        assert!(partition(0, 4).is_empty());
        assert!(partition(5, 0).is_empty());
        assert_eq!(partition(2, 8), vec![0..1, 1..2]);
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name(&"photo.jpg".into()), PathBuf::from("photo.png"));
        assert_eq!(output_file_name(&"a.tar.gz".into()), PathBuf::from("a.tar.png"));
        assert_eq!(output_file_name(&"noext".into()), PathBuf::from("noext.png"));
    }

    #[test]
    fn test_list_entries_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.jpg", "a.jpg", "b.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let all = list_entries(dir.path(), None).unwrap();
        assert_eq!(all, vec![OsString::from("a.jpg"), "b.txt".into(), "c.jpg".into()]);

        let jpgs = list_entries(dir.path(), Some("*.jpg")).unwrap();
        assert_eq!(jpgs, vec![OsString::from("a.jpg"), "c.jpg".into()]);
    }

    #[test]
    fn test_missing_input_directory_is_fatal() {
        assert!(list_entries(Path::new("/definitely/not/a/dir"), None).is_err());
    }
}
