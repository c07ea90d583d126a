//! Command line handling of the `service-host` binary.

use std::process::{Command, Output};

fn service_host(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_service-host"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn unreadable_config_prints_usage() {
    let missing = std::env::temp_dir().join("service-host-missing-config.toml");
    let output = service_host(&["--config", missing.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = stderr(&output);
    assert!(stderr.contains("IO error"), "stderr: {stderr}");
    assert!(stderr.contains("Usage:"), "stderr: {stderr}");
}

#[test]
fn malformed_config_prints_usage() {
    let path = std::env::temp_dir().join(format!("service-host-malformed-{}.toml", std::process::id()));
    std::fs::write(&path, "[server\nhttp_port = ").unwrap();

    let output = service_host(&["--config", path.to_str().unwrap()]);
    std::fs::remove_file(&path).unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = stderr(&output);
    assert!(stderr.contains("Parse error"), "stderr: {stderr}");
    assert!(stderr.contains("Usage:"), "stderr: {stderr}");
}

#[test]
fn invalid_config_lists_every_error_and_usage() {
    let output = service_host(&["--http-port", "9000", "--http-admin-port", "9000"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = stderr(&output);
    assert!(stderr.contains("server.stop_secret must not be empty"), "stderr: {stderr}");
    assert!(stderr.contains("must differ (both 9000)"), "stderr: {stderr}");
    assert!(stderr.contains("Usage:"), "stderr: {stderr}");
}
