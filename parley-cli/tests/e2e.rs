//! End-to-end integration tests for parley-cli
//!
//! These tests build and run the binary, so they are gated behind the
//! `integration` feature flag. Run with:
//!
//! ```sh
//! cargo test -p parley-cli --features integration
//! ```

#![cfg(feature = "integration")]

use std::process::Command;

use tempfile::TempDir;

/// Run `parley` with every config and data path pointed into `home`
fn parley(home: &TempDir, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_parley"))
        .args(args)
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("PARLEY_PROJECT_CONFIG_DIR", home.path().join("project"))
        .env_remove("PARLEY_SOCKET_URL")
        .env_remove("PARLEY_API_URL")
        .env_remove("PARLEY_ACCESS_TOKEN")
        .output()
        .expect("Failed to run parley")
}

/// Test that parley --help lists every subcommand
#[test]
fn parley_help_works() {
    let home = TempDir::new().unwrap();
    let output = parley(&home, &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Realtime chat from the terminal"));
    assert!(stdout.contains("chat"));
    assert!(stdout.contains("auth"));
    assert!(stdout.contains("config"));
}

/// Test that parley chat --help shows its flags
#[test]
fn parley_chat_help_shows_flags() {
    let home = TempDir::new().unwrap();
    let output = parley(&home, &["chat", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--user"));
    assert!(stdout.contains("--room"));
}

/// Test that parley config show works without config file
#[test]
fn parley_config_show_works_without_config() {
    let home = TempDir::new().unwrap();
    let output = parley(&home, &["config", "show"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Should show defaults
    assert!(stdout.contains("[server]"));
    assert!(stdout.contains("endpoint = \"http://localhost:3001\""));
    assert!(stdout.contains("delay = \"1s\""));
}

/// Test that the environment overrides the configured endpoint
#[test]
fn parley_config_show_applies_env() {
    let home = TempDir::new().unwrap();
    let project = home.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(
        project.join("config.toml"),
        "[server]\nendpoint = \"http://project.example:3001\"\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_parley"))
        .args(["config", "show"])
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("PARLEY_PROJECT_CONFIG_DIR", &project)
        .env("PARLEY_SOCKET_URL", "https://env.example/")
        .output()
        .expect("Failed to run parley config show");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("endpoint = \"https://env.example\""));
}

/// Test the auth login / status / logout cycle
#[test]
fn parley_auth_round_trip() {
    let home = TempDir::new().unwrap();

    let login = parley(&home, &["auth", "login", "--token", "abcdefghijklmnop"]);
    assert!(login.status.success());
    assert!(
        home.path()
            .join("data")
            .join("parley")
            .join("credentials.toml")
            .exists()
    );

    let status = parley(&home, &["auth", "status"]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("abcd********"));
    assert!(!stdout.contains("abcdefghijklmnop"));

    let logout = parley(&home, &["auth", "logout"]);
    assert!(String::from_utf8_lossy(&logout.stdout).contains("Access token removed"));
}

/// Test that chat refuses to start without a user id
#[test]
fn parley_chat_requires_user() {
    let home = TempDir::new().unwrap();
    let output = parley(&home, &["chat"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No user id"));
}
