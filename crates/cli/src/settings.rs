//! CLI settings: config file, then environment, then flags.
//!
//! ```json
//! {
//!   "url": "wss://gateway.example.com/ws",
//!   "token": "...",
//!   "session": { "requestTimeoutMs": 60000, "backoff": { "maxMs": 10000 } }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use gw_runtime::{Credentials, SessionConfig};
use serde::Deserialize;
use tracing::debug;

use crate::cli::Cli;
use crate::error::{CliError, Result};

pub const ENV_URL: &str = "GW_GATEWAY_URL";
pub const ENV_TOKEN: &str = "GW_GATEWAY_TOKEN";
pub const ENV_PASSWORD: &str = "GW_GATEWAY_PASSWORD";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
	pub url: Option<String>,
	pub token: Option<String>,
	pub password: Option<String>,
	pub session: SessionConfig,
}

impl Settings {
	/// `$XDG_CONFIG_HOME/gw/config.json` or the platform equivalent.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join("gw").join("config.json"))
	}

	/// Resolves settings for `cli` from every source.
	pub fn resolve(cli: &Cli) -> Result<Self> {
		let mut settings = match &cli.config {
			Some(path) => Self::load(path)?,
			None => match Self::default_path() {
				Some(path) => Self::load_if_exists(&path)?,
				None => Self::default(),
			},
		};
		settings.apply_env(|key| std::env::var(key).ok());
		settings.apply_flags(cli);
		Ok(settings)
	}

	/// Reads a config file that must exist.
	pub fn load(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
			path: path.to_path_buf(),
			source,
		})?;
		let settings = serde_json::from_str(&content).map_err(|source| CliError::ParseConfig {
			path: path.to_path_buf(),
			source,
		})?;
		debug!(path = %path.display(), "Loaded config");
		Ok(settings)
	}

	/// Reads a config file, treating a missing file as empty.
	pub fn load_if_exists(path: &Path) -> Result<Self> {
		if !path.exists() {
			return Ok(Self::default());
		}
		Self::load(path)
	}

	/// Overrides fields from environment variables read through `lookup`.
	pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
		let non_empty = |key: &str| lookup(key).filter(|value: &String| !value.is_empty());
		if let Some(url) = non_empty(ENV_URL) {
			self.url = Some(url);
		}
		if let Some(token) = non_empty(ENV_TOKEN) {
			self.token = Some(token);
		}
		if let Some(password) = non_empty(ENV_PASSWORD) {
			self.password = Some(password);
		}
	}

	pub fn apply_flags(&mut self, cli: &Cli) {
		if let Some(url) = &cli.url {
			self.url = Some(url.clone());
		}
		if let Some(token) = &cli.token {
			self.token = Some(token.clone());
		}
		if let Some(password) = &cli.password {
			self.password = Some(password.clone());
		}
	}

	pub fn url(&self) -> Result<&str> {
		self.url.as_deref().ok_or(CliError::MissingUrl)
	}

	pub fn credentials(&self) -> Credentials {
		Credentials {
			token: self.token.clone(),
			password: self.password.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use clap::Parser;
	use tempfile::TempDir;

	use super::*;

	fn write_config(dir: &TempDir, content: &str) -> PathBuf {
		let path = dir.path().join("config.json");
		fs::write(&path, content).unwrap();
		path
	}

	#[test]
	fn load_reads_nested_session_config() {
		let dir = TempDir::new().unwrap();
		let path = write_config(
			&dir,
			r#"{"url": "ws://127.0.0.1:18789", "token": "t", "session": {"requestTimeoutMs": 500}}"#,
		);

		let settings = Settings::load(&path).unwrap();
		assert_eq!(settings.url.as_deref(), Some("ws://127.0.0.1:18789"));
		assert_eq!(settings.session.request_timeout_ms, 500);
		assert_eq!(settings.session.handshake_timeout_ms, 10_000);
	}

	#[test]
	fn missing_default_file_is_empty() {
		let dir = TempDir::new().unwrap();
		let settings = Settings::load_if_exists(&dir.path().join("absent.json")).unwrap();
		assert!(settings.url.is_none());
		assert!(matches!(settings.url(), Err(CliError::MissingUrl)));
	}

	#[test]
	fn missing_explicit_file_is_an_error() {
		let dir = TempDir::new().unwrap();
		let result = Settings::load(&dir.path().join("absent.json"));
		assert!(matches!(result, Err(CliError::ReadConfig { .. })));
	}

	#[test]
	fn malformed_file_names_the_path() {
		let dir = TempDir::new().unwrap();
		let path = write_config(&dir, "{ not json");
		let err = Settings::load(&path).unwrap_err();
		assert!(matches!(err, CliError::ParseConfig { .. }));
		assert!(err.to_string().contains("config.json"));
	}

	#[test]
	fn env_overrides_file_and_flags_override_env() {
		let dir = TempDir::new().unwrap();
		let path = write_config(&dir, r#"{"url": "ws://file", "token": "file-token"}"#);
		let mut settings = Settings::load(&path).unwrap();

		let env: HashMap<&str, &str> = [(ENV_URL, "ws://env"), (ENV_TOKEN, ""), (ENV_PASSWORD, "env-pass")].into();
		settings.apply_env(|key| env.get(key).map(|v| v.to_string()));
		assert_eq!(settings.url.as_deref(), Some("ws://env"));
		assert_eq!(settings.token.as_deref(), Some("file-token"));
		assert_eq!(settings.password.as_deref(), Some("env-pass"));

		let cli = Cli::try_parse_from(["gw", "status", "--url", "wss://flag"]).unwrap();
		settings.apply_flags(&cli);
		assert_eq!(settings.url().unwrap(), "wss://flag");
		assert_eq!(settings.credentials().token.as_deref(), Some("file-token"));
	}
}
