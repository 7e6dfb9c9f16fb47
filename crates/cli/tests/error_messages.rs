//! Integration tests for failures reported before any gateway is reached.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn run_gw(home: &Path, args: &[&str]) -> Output {
	Command::new(env!("CARGO_BIN_EXE_gw"))
		.env("HOME", home)
		.env("XDG_CONFIG_HOME", home.join(".config"))
		.env_remove("GW_GATEWAY_URL")
		.env_remove("GW_GATEWAY_TOKEN")
		.env_remove("GW_GATEWAY_PASSWORD")
		.env_remove("RUST_LOG")
		.args(args)
		.output()
		.expect("failed to execute gw")
}

fn stderr(output: &Output) -> String {
	String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn missing_url_explains_every_source() {
	let home = TempDir::new().unwrap();
	let output = run_gw(home.path(), &["status"]);

	assert_eq!(output.status.code(), Some(1));
	let msg = stderr(&output);
	assert!(msg.contains("--url"), "got: {msg}");
	assert!(msg.contains("GW_GATEWAY_URL"), "got: {msg}");
}

#[test]
fn http_url_is_rejected() {
	let home = TempDir::new().unwrap();
	let output = run_gw(home.path(), &["status", "--url", "http://127.0.0.1:18789"]);

	assert_eq!(output.status.code(), Some(1));
	let msg = stderr(&output);
	assert!(msg.contains("ws:// or wss://"), "got: {msg}");
}

#[test]
fn url_from_environment_is_used() {
	let home = TempDir::new().unwrap();
	let output = Command::new(env!("CARGO_BIN_EXE_gw"))
		.env("HOME", home.path())
		.env("XDG_CONFIG_HOME", home.path().join(".config"))
		.env("GW_GATEWAY_URL", "ftp://example.com")
		.args(["status"])
		.output()
		.expect("failed to execute gw");

	assert_eq!(output.status.code(), Some(1));
	assert!(stderr(&output).contains("ftp://"), "got: {}", stderr(&output));
}

#[test]
fn malformed_default_config_names_the_file() {
	let home = TempDir::new().unwrap();
	let dir = home.path().join(".config").join("gw");
	std::fs::create_dir_all(&dir).unwrap();
	std::fs::write(dir.join("config.json"), "{ not json").unwrap();

	let output = run_gw(home.path(), &["status"]);
	assert_eq!(output.status.code(), Some(1));
	let msg = stderr(&output);
	assert!(msg.contains("invalid config"), "got: {msg}");
	assert!(msg.contains("config.json"), "got: {msg}");
}

#[test]
fn explicit_missing_config_is_an_error() {
	let home = TempDir::new().unwrap();
	let missing = home.path().join("nope.json");
	let output = run_gw(home.path(), &["--config", missing.to_str().unwrap(), "status"]);

	assert_eq!(output.status.code(), Some(1));
	assert!(stderr(&output).contains("failed to read config"));
}

#[test]
fn invalid_session_config_is_rejected() {
	let home = TempDir::new().unwrap();
	let config = home.path().join("gw.json");
	std::fs::write(
		&config,
		r#"{"url": "ws://127.0.0.1:9", "session": {"backoff": {"jitter": 2.0}}}"#,
	)
	.unwrap();

	let output = run_gw(home.path(), &["--config", config.to_str().unwrap(), "status"]);
	assert_eq!(output.status.code(), Some(1));
	let msg = stderr(&output);
	assert!(msg.contains("jitter"), "got: {msg}");
}
