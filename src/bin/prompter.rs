//! Prompter command line binary
//!
//! ```bash
//! prompter check demo.story
//! prompter run demo.story
//! ```
//!
//! Logging goes to stderr so piped output stays clean; set
//! `RUST_LOG=debug` to watch the engine step through blocks.

use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = prompter_core::cli::run_cli() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
