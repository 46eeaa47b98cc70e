//! Tracing initialisation.

use anyhow::{Context, Result};
use stich_core::config::LoggingSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::paths::StichPaths;

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `settings.level`. With
/// `settings.file` set, output goes to a daily rolling file under the logs
/// directory and the returned guard must be held until shutdown.
pub fn init_tracing(settings: &LoggingSettings, paths: &StichPaths) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .context("Invalid log filter")?;

    if settings.file {
        let log_dir = paths.logs_dir()?;
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let appender = tracing_appender::rolling::daily(&log_dir, "stich.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(
                fmt::Layer::new()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .try_init()
            .context("Failed to set global default subscriber")?;

        tracing::debug!(path = %log_dir.display(), "Tracing initialized with file output");
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::Layer::new()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .try_init()
            .context("Failed to set global default subscriber")?;

        tracing::debug!("Tracing initialized with stderr output");
        Ok(None)
    }
}
