use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use glob::glob;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Errors raised while bootstrapping logging.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log directory could not be created.
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The rotation glob could not be built from the directory name.
    #[error("invalid log rotation pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// The configured level is not a valid filter directive.
    #[error("invalid log level: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// # Logger Local Options
///
/// Where and how much to log. Console output is always on; file output is on
/// when `log_dir` is set.
#[derive(Debug, Clone)]
pub struct LoggerLocalOptions {
    /// Prefix of the log file names, usually the binary name.
    pub app_name: String,
    /// Directory for log files. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    /// Default filter directive, e.g. `info` or `lib_common=debug,info`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Older files of the same app kept on startup, besides the new one.
    pub keep_files: usize,
}

impl Default for LoggerLocalOptions {
    fn default() -> Self {
        Self {
            app_name: "orbital".to_string(),
            log_dir: None,
            level: "info".to_string(),
            keep_files: 1,
        }
    }
}

/// Timestamped file name for a new run: `<app>-YYYYmmdd_HHMMSS.log`.
pub fn log_file_name(app_name: &str) -> String {
    format!("{}-{}.log", app_name, Local::now().format("%Y%m%d_%H%M%S"))
}

/// Deletes all but the `keep` newest log files of `app_name` in `log_dir`.
///
/// File names embed their start time, so name order is age order. Returns
/// how many files were removed.
pub fn rotate_logs(app_name: &str, log_dir: &Path, keep: usize) -> Result<usize, LoggerError> {
    let pattern = format!(
        "{}/{}-*.log",
        glob::Pattern::escape(&log_dir.display().to_string()),
        glob::Pattern::escape(app_name)
    );

    let mut log_files: Vec<PathBuf> = glob(&pattern)?.filter_map(Result::ok).collect();
    log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    let mut removed = 0;
    for old_file in log_files.iter().skip(keep) {
        match std::fs::remove_file(old_file) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Error deleting old log file {}: {}", old_file.display(), e),
        }
    }
    Ok(removed)
}

/// # Init Logging
///
/// Installs the global `tracing` subscriber: an env-filtered console layer
/// and, when a directory is configured, a JSON file layer written through a
/// non-blocking appender.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_logging(options: &LoggerLocalOptions) -> Result<Option<WorkerGuard>, LoggerError> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&options.level))?;
    let console_layer = fmt::layer().with_target(true);

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggerError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            rotate_logs(&options.app_name, dir, options.keep_files)?;

            let appender = tracing_appender::rolling::never(dir, log_file_name(&options.app_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(level = %options.level, file = options.log_dir.is_some(), "Logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_log_file_name_shape() {
        let name = log_file_name("server_orbital");
        assert!(name.starts_with("server_orbital-"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "server_orbital-".len() + "20240101_000000".len() + ".log".len());
    }

    #[test]
    fn test_rotate_keeps_newest_files() {
        let dir = tempdir().unwrap();
        for stamp in ["20240101_000000", "20240102_000000", "20240103_000000"] {
            fs::write(dir.path().join(format!("orbital-{stamp}.log")), "x").unwrap();
        }
        fs::write(dir.path().join("other-20240101_000000.log"), "x").unwrap();

        let removed = rotate_logs("orbital", dir.path(), 1).unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().join("orbital-20240103_000000.log").exists());
        assert!(!dir.path().join("orbital-20240101_000000.log").exists());
        assert!(dir.path().join("other-20240101_000000.log").exists());
    }

    #[test]
    fn test_rotate_on_empty_directory() {
        let dir = tempdir().unwrap();
        assert_eq!(rotate_logs("orbital", dir.path(), 0).unwrap(), 0);
    }
}
