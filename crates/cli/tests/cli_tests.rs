//! CLI integration tests

use std::process::Command;

fn wpm(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_wpm"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = wpm(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("WordPress hosting metrics aggregator"),
        "Should show app description"
    );
    for command in ["tasks", "usage", "history", "cluster", "health", "logs"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = wpm(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("wpm"), "Should show binary name");
}

/// Test history subcommand help
#[test]
fn test_history_help() {
    let output = wpm(&["history", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--range"), "Should show range flag");
    assert!(stdout.contains("1H"), "Should show default range");
}

/// Test logs subcommand help
#[test]
fn test_logs_help() {
    let output = wpm(&["logs", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--lines"), "Should show lines flag");
}

/// Test that an unsupported range is rejected before any request
#[test]
fn test_invalid_range_rejected() {
    let output = wpm(&["history", "t1", "--range", "30D"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("unsupported range"), "Should explain the error");
}

/// Test that a tenant argument is required
#[test]
fn test_tasks_requires_tenant() {
    let output = wpm(&["tasks"]);
    assert!(!output.status.success());
}

/// Test that an unreachable aggregator is reported as an error
#[test]
fn test_unreachable_aggregator() {
    let output = wpm(&["--api-url", "http://127.0.0.1:1", "cluster"]);
    assert!(!output.status.success());
}
