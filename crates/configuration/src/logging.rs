use crate::error::ConfigError;
use crate::settings::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global tracing subscriber.
///
/// Logs go to stdout and, when `directory` is configured, to a daily
/// rolling file. The returned guard flushes the file writer on drop and must
/// be held for the lifetime of the process.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stdout);

    match &cfg.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|e| ConfigError::Logging(e.to_string()))?;
            let appender = tracing_appender::rolling::daily(directory, &cfg.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(None)
        }
    }
}
