//! Session configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::fmt;
use std::time::Duration;

use gw_protocol::{ClientInfo, ConnectAuth, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};

/// Tunables for one [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
	/// Deadline from transport open to hello.
	pub handshake_timeout_ms: u64,
	/// Default per-request deadline.
	pub request_timeout_ms: u64,
	/// Deadline for opening the socket.
	pub connect_timeout_ms: u64,
	/// Ticks that may be missed before the connection counts as dead.
	pub stale_tick_multiplier: u32,
	/// Tick interval assumed when the hello carries no policy.
	pub default_tick_interval_ms: u64,
	pub backoff: BackoffConfig,
	pub min_protocol: u32,
	pub max_protocol: u32,
	pub client: ClientConfig,
	pub role: String,
	pub scopes: Vec<String>,
	pub caps: Vec<String>,
	pub commands: Vec<String>,
	pub permissions: Map<String, Value>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			handshake_timeout_ms: 10_000,
			request_timeout_ms: 30_000,
			connect_timeout_ms: 10_000,
			stale_tick_multiplier: 3,
			default_tick_interval_ms: 30_000,
			backoff: BackoffConfig::default(),
			min_protocol: PROTOCOL_VERSION,
			max_protocol: PROTOCOL_VERSION,
			client: ClientConfig::default(),
			role: "operator".to_string(),
			scopes: vec!["operator.read".to_string(), "operator.write".to_string()],
			caps: Vec::new(),
			commands: Vec::new(),
			permissions: Map::new(),
		}
	}
}

impl SessionConfig {
	/// Checks invariants that serde cannot express.
	pub fn validate(&self) -> Result<()> {
		let timeouts = [
			("handshakeTimeoutMs", self.handshake_timeout_ms),
			("requestTimeoutMs", self.request_timeout_ms),
			("connectTimeoutMs", self.connect_timeout_ms),
			("defaultTickIntervalMs", self.default_tick_interval_ms),
		];
		if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
			return Err(Error::InvalidConfig(format!("{name} must be greater than zero")));
		}
		if self.stale_tick_multiplier == 0 {
			return Err(Error::InvalidConfig("staleTickMultiplier must be at least 1".into()));
		}
		if self.min_protocol > self.max_protocol {
			return Err(Error::InvalidConfig(format!(
				"minProtocol {} exceeds maxProtocol {}",
				self.min_protocol, self.max_protocol
			)));
		}
		self.backoff.validate()
	}

	pub fn handshake_timeout(&self) -> Duration {
		Duration::from_millis(self.handshake_timeout_ms)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}

	/// Silence window after which a `Ready` connection is declared dead.
	pub fn stale_after(&self, tick_interval_ms: Option<u64>) -> Duration {
		let tick = tick_interval_ms.filter(|ms| *ms > 0).unwrap_or(self.default_tick_interval_ms);
		Duration::from_millis(tick.saturating_mul(u64::from(self.stale_tick_multiplier)))
	}
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
	pub initial_ms: u64,
	pub max_ms: u64,
	pub factor: f64,
	/// Relative spread applied to each delay, `0.2` means ±20%.
	pub jitter: f64,
}

impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			initial_ms: 1_000,
			max_ms: 30_000,
			factor: 2.0,
			jitter: 0.2,
		}
	}
}

impl BackoffConfig {
	pub fn validate(&self) -> Result<()> {
		if self.initial_ms == 0 || self.initial_ms > self.max_ms {
			return Err(Error::InvalidConfig(format!(
				"backoff initialMs {} must be in 1..={}",
				self.initial_ms, self.max_ms
			)));
		}
		if !(self.factor >= 1.0) {
			return Err(Error::InvalidConfig(format!("backoff factor {} must be >= 1", self.factor)));
		}
		if !(0.0..1.0).contains(&self.jitter) {
			return Err(Error::InvalidConfig(format!("backoff jitter {} must be in [0, 1)", self.jitter)));
		}
		Ok(())
	}
}

/// Client identity sent in `connect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
	pub id: String,
	pub display_name: Option<String>,
	pub version: String,
	pub platform: String,
	pub mode: String,
	pub instance_id: Option<String>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			id: "gw-rs".to_string(),
			display_name: None,
			version: env!("CARGO_PKG_VERSION").to_string(),
			platform: std::env::consts::OS.to_string(),
			mode: "cli".to_string(),
			instance_id: None,
		}
	}
}

impl From<&ClientConfig> for ClientInfo {
	fn from(client: &ClientConfig) -> Self {
		ClientInfo {
			id: client.id.clone(),
			display_name: client.display_name.clone(),
			version: client.version.clone(),
			platform: client.platform.clone(),
			mode: client.mode.clone(),
			instance_id: client.instance_id.clone(),
		}
	}
}

/// Credentials presented during the handshake.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
	pub token: Option<String>,
	pub password: Option<String>,
}

impl Credentials {
	pub fn token(token: impl Into<String>) -> Self {
		Self {
			token: Some(token.into()),
			password: None,
		}
	}

	pub fn password(password: impl Into<String>) -> Self {
		Self {
			token: None,
			password: Some(password.into()),
		}
	}

	/// Wire form; a token wins over a password.
	pub fn to_auth(&self) -> Option<ConnectAuth> {
		if let Some(token) = &self.token {
			return Some(ConnectAuth {
				token: Some(token.clone()),
				password: None,
			});
		}
		self.password.as_ref().map(|password| ConnectAuth {
			token: None,
			password: Some(password.clone()),
		})
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
		f.debug_struct("Credentials")
			.field("token", &redact(&self.token))
			.field("password", &redact(&self.password))
			.finish()
	}
}

/// Parses a Gateway URL, accepting only `ws` and `wss`.
pub fn parse_gateway_url(raw: &str) -> Result<Url> {
	let url = Url::parse(raw).map_err(|e| Error::InvalidConfig(format!("invalid gateway URL '{raw}': {e}")))?;
	match url.scheme() {
		"ws" | "wss" => Ok(url),
		other => Err(Error::InvalidConfig(format!(
			"gateway URL must use ws:// or wss://, got '{other}://'"
		))),
	}
}
