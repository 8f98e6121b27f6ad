use std::fs::OpenOptions;
use std::path::Path;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILTER: &str = "info";
pub const ENV_VAR_LOG_FILE: &str = "ENI_ROUTING_LOG_FILE";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Initializes the global `tracing` subscriber writing to the file at `log_path`.
///
/// The file is opened in append mode and created if missing. ANSI colors are
/// disabled. Verbosity follows `RUST_LOG`, defaulting to `"info"`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn setup_log_file(log_path: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(BoxMakeWriter::new(file)).with_ansi(false))
        .with(env_filter())
        .init();
    tracing::debug!(log_path = %log_path.display(), "logging initialized with file output");
    Ok(())
}

/// Initializes the global `tracing` subscriber with stdout logging.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn setup_stdout() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true))
        .with(env_filter())
        .init();
    tracing::debug!("logging initialized with stdout output");
}
