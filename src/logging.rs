use anyhow::{Context, Result};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs::File;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Open `path` for logging behind a background writer thread.
fn log_file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let file = File::create(path).with_context(|| format!("Cannot open log file {:?}", path))?;
    Ok(tracing_appender::non_blocking(file))
}

/// Install the global subscriber for the command line tools.
///
/// Messages go to stderr so stdout stays clean for command output. With
/// `log_file` set they are mirrored there without colour; keep the returned
/// guard alive until exit. `RUST_LOG` takes precedence over `-v`/`-q`.
pub fn setup_logging(log_file: Option<&Path>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file.map(log_file_writer).transpose()? {
        Some((writer, guard)) => (
            Some(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(verbosity.tracing_level_filter().into())
                .from_env_lossy(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(file_layer)
        .init();

    if let Some(path) = log_file {
        info!(?path, "Mirroring log output");
    }
    Ok(guard)
}
