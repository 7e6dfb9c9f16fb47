use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("no gateway URL; pass --url, set GW_GATEWAY_URL or add \"url\" to the config file")]
	MissingUrl,

	#[error("failed to read config {path}")]
	ReadConfig {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config {path}")]
	ParseConfig {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("params must be a JSON object or array: {0}")]
	InvalidParams(String),
}
