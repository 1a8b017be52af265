//! Tracing initialization for the workbench process.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr: stdout carries the
/// IPC control frames.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
