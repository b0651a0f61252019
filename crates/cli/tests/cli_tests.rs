//! CLI integration tests

use std::io::Write;
use std::process::{Command, Output};

fn kubesleep(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kubesleep"))
        .args(args)
        .env("KUBESLEEP_UPDATE_CHECK", "false")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = kubesleep(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("sleep and wake"), "Should describe the tool");
    assert!(stdout.contains("suspend"), "Should show suspend command");
    assert!(stdout.contains("wake"), "Should show wake command");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("version"), "Should show version command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version_flag() {
    let output = kubesleep(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("kubesleep"), "Should show binary name");
}

/// Test the version subcommand prints build information
#[test]
fn test_version_command() {
    let output = kubesleep(&["version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "version should succeed");
    assert!(stdout.contains("Version:"), "Should show version");
    assert!(stdout.contains("Commit:"), "Should show commit");
    assert!(stdout.contains("Platform:"), "Should show platform");
}

/// Test suspend subcommand help
#[test]
fn test_suspend_help() {
    let output = kubesleep(&["suspend", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Suspend help should succeed");
    assert!(stdout.contains("--namespace"), "Should show namespace option");
    assert!(
        stdout.contains("--all-namespaces"),
        "Should show all-namespaces option"
    );
    assert!(stdout.contains("--force"), "Should show force option");
}

/// Test global options
#[test]
fn test_global_options() {
    let output = kubesleep(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("--kubeconfig"), "Should show kubeconfig option");
    assert!(stdout.contains("--context"), "Should show context option");
    assert!(stdout.contains("--verbose"), "Should show verbose option");
}

/// Test that force cannot be combined with all namespaces
#[test]
fn test_suspend_all_namespaces_with_force() {
    let output = kubesleep(&["suspend", "--all-namespaces", "--force"]);

    assert_eq!(output.status.code(), Some(2), "Argument error exit code");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("cannot be used with"),
        "Should explain the conflict"
    );
}

/// Test suspend without any namespace selection
#[test]
fn test_suspend_without_namespace() {
    let output = kubesleep(&["suspend"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("either --all-namespaces or --namespace (-n) must be specified"),
        "Should show error about missing namespace"
    );
}

/// Test wake requires a namespace
#[test]
fn test_wake_without_namespace() {
    let output = kubesleep(&["wake"]);

    assert!(!output.status.success(), "Missing argument should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required"),
        "Should show error about missing argument"
    );
}

/// Test empty namespace names are rejected before connecting
#[test]
fn test_empty_namespace_name() {
    let output = kubesleep(&["status", "-n", ""]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("namespace must not be empty"));
}

/// Test wake validates its namespaces before connecting
#[test]
fn test_wake_empty_namespace_name() {
    let output = kubesleep(&["wake", "-n", "team-a", "-n", ""]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("namespace must not be empty"));
}

/// Test an unreadable kubeconfig is reported
#[test]
fn test_invalid_kubeconfig() {
    let mut kubeconfig = tempfile::NamedTempFile::new().unwrap();
    writeln!(kubeconfig, "clusters: [not valid").unwrap();
    let path = kubeconfig.path().to_str().unwrap().to_string();

    let output = kubesleep(&["status", "-n", "default", "--kubeconfig", &path]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("kubeconfig"), "Should mention the kubeconfig");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = kubesleep(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}
