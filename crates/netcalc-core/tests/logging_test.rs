//! Log file tests.
//!
//! Installing the global subscriber can only happen once per process, so this
//! file holds a single test.

use netcalc_core::logging::{LogConfig, init_logging, log_new_start};

#[test]
fn log_file_is_appended_with_start_banner() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("calc.log");
    std::fs::write(&path, "previous run\n").expect("seed log file");

    let config = LogConfig {
        file: path.clone(),
        level: "info".to_string(),
        console_level: Some("error".to_string()),
        ansi: false,
    };
    let guard = init_logging(&config, std::io::sink).expect("install subscriber");

    log_new_start("netcalc-test");
    tracing::info!(result = 5.0, "+ 2 3 evaluated");

    // Dropping the guard flushes the non-blocking writer.
    drop(guard);

    let contents = std::fs::read_to_string(&path).expect("read log file");
    assert!(contents.starts_with("previous run\n"), "log must be appended, got {contents:?}");
    assert!(contents.contains("new start: netcalc-test"));
    assert!(contents.contains("+ 2 3 evaluated"));
    assert!(contents.contains("result=5.0"));
}
