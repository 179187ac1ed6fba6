//! Logging initialization for binaries embedding the controller.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter.
///
/// If the variable is unset the maximum log level is INFO. Log output is
/// additionally copied to a rotated file when `{env}_DIRECTORY` points at a
/// directory, e.g. `KUKEON_LOG_DIRECTORY`.
pub fn initialize_logging(env: &str, app_name: &str) {
    let filter = match EnvFilter::try_from_env(env) {
        Ok(env_filter) => env_filter,
        _ => EnvFilter::try_new(tracing::Level::INFO.to_string())
            .expect("failed to initialize default tracing level to INFO"),
    };

    let terminal_fmt = tracing_subscriber::fmt::layer();

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_fmt = file_appender_directory.as_deref().map(|log_dir| {
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::HOURLY)
            .filename_prefix(app_name.to_string())
            .filename_suffix("tracing-rs.json")
            .max_log_files(6)
            .build(log_dir)
            .expect("failed to initialize rolling file appender");
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(file_appender)
    });

    Registry::default()
        .with(filter)
        .with(terminal_fmt)
        .with(file_fmt)
        .init();

    match file_appender_directory {
        Some(dir) => tracing::info!(directory = %dir.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }
}
