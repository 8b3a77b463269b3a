//! Tracing setup.
//!
//! Logs always go to stderr. With `logging.log_to_file` they are also
//! written to daily-rotated files under [`crate::app_dirs::logs_dir`]; old
//! files beyond `logging.max_log_files` are pruned at startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{ClientError, Result};

/// Build the filter: `RUST_LOG` if set, otherwise the configured level.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
///
/// # Errors
///
/// Returns [`ClientError::Config`] if a global subscriber is already set
/// and [`ClientError::Io`] if the log directory cannot be created.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = if config.log_to_file {
        let dir = crate::app_dirs::logs_dir();
        fs::create_dir_all(&dir)?;
        prune_old_logs(&dir, &config.file_prefix, config.max_log_files);

        let appender = tracing_appender::rolling::daily(&dir, &config.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| ClientError::Config(format!("tracing already initialised: {e}")))?;

    Ok(guard)
}

/// Delete rotated `<prefix>.*` files beyond the newest `max_files`.
pub fn prune_old_logs(log_dir: &Path, prefix: &str, max_files: usize) {
    let marker = format!("{prefix}.");
    let mut entries: Vec<(PathBuf, SystemTime)> = match fs::read_dir(log_dir) {
        Ok(dir) => dir
            .flatten()
            .filter_map(|e| {
                let path = e.path();
                let name = path.file_name()?.to_str()?.to_owned();
                if name.starts_with(&marker) {
                    let mtime = path.metadata().ok()?.modified().ok()?;
                    Some((path, mtime))
                } else {
                    None
                }
            })
            .collect(),
        Err(_) => return,
    };

    // Newest first.
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in entries.iter().skip(max_files) {
        if let Err(e) = fs::remove_file(path) {
            tracing::debug!(path = %path.display(), "failed to prune log file: {e}");
        }
    }
}
