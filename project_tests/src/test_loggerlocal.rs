use lib_common::loggers::{init_logging, LoggerLocalOptions};
use std::fs;
use tempfile::tempdir;
use tracing::{info, warn};

/// # Logging Bootstrap Integration Test
///
/// Installs the global subscriber with a file layer in a temporary
/// directory, then checks that:
/// 1.  Older log files of the same app were rotated out before the new file opened.
/// 2.  Records, structured fields included, reach the JSON log file once the guard flushes.
#[test]
fn test_init_logging_writes_json_file() {
    let temp_dir = tempdir().unwrap();
    let log_dir = temp_dir.path().to_path_buf();
    for stamp in ["20240101_000000", "20240102_000000"] {
        fs::write(log_dir.join(format!("test_app-{stamp}.log")), "old\n").unwrap();
    }

    let guard = init_logging(&LoggerLocalOptions {
        app_name: "test_app".to_string(),
        log_dir: Some(log_dir.clone()),
        level: "info".to_string(),
        keep_files: 1,
    })
    .unwrap();
    assert!(guard.is_some());

    info!("This is an info message");
    warn!(code = 101, "This is a warning message");

    // Dropping the guard flushes the non-blocking writer
    drop(guard);

    assert!(!log_dir.join("test_app-20240101_000000.log").exists());
    assert!(log_dir.join("test_app-20240102_000000.log").exists());

    let new_file = fs::read_dir(&log_dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            name.starts_with("test_app-") && !name.starts_with("test_app-2024")
        })
        .expect("no log file was created for this run");

    let contents = fs::read_to_string(&new_file).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert!(lines.iter().any(|l| l["fields"]["message"] == "This is an info message" && l["level"] == "INFO"));
    assert!(lines.iter().any(|l| l["fields"]["code"] == 101 && l["level"] == "WARN"));
}
