//! bgcompose CLI tool
//!
//! Command-line interface for compositing images and raw frame streams over a
//! new background using foreground masks.

#[cfg(feature = "cli")]
use bgcompose::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
