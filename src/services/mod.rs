//! Services separating I/O and progress concerns from the drivers

pub mod io;
pub mod progress;

pub use io::ImageIOService;
pub use progress::{ConsoleProgressReporter, NoOpProgressReporter, ProgressReporter};
