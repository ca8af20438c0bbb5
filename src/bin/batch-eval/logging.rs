use std::path::PathBuf;

use batch_eval::config::LoggingConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming};

/// Logs to stderr, or to a rotated file when `path` is set. `RUST_LOG` wins
/// over the configured level.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggerHandle> {
    let logger = Logger::try_with_env_or_str(&config.level)?;
    let logger = match config.path.as_ref().map(PathBuf::from) {
        Some(log_path) => {
            let directory = log_path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let basename = log_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("batch-eval")
                .to_string();
            logger
                .log_to_file(FileSpec::default().directory(directory).basename(basename))
                .rotate(
                    Criterion::Size(config.rotate_size),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(config.rotate_keep),
                )
        }
        None => logger.log_to_stderr(),
    };
    Ok(logger.start()?)
}
