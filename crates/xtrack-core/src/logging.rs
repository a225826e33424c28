use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{errors::Error, Result};

const LOG_FILE_PREFIX: &str = "xtrack.log";

/// Where logs go besides stderr.
#[derive(Clone, Debug)]
pub struct LogSettings {
    /// Write a daily-rotated log file into `dir`.
    pub file_enabled: bool,
    pub dir: PathBuf,
}

/// Keeps the non-blocking file writer alive; drop it last in `main` to flush.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing for the process.
///
/// Default level is info. Can be overridden with `RUST_LOG`.
pub fn init(service_name: &str, settings: &LogSettings) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,xtrack=info,xtrack_core=info,xtrack_rapidapi=info,xtrack_discord=info,xtrack_telegram=info,{service_name}=info"
        ))
    });

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(true);

    let (file_layer, guard) = if settings.file_enabled {
        std::fs::create_dir_all(&settings.dir)?;
        let appender = tracing_appender::rolling::daily(&settings.dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::External(format!("failed to install tracing subscriber: {e}")))?;

    Ok(LogGuard { _file: guard })
}
