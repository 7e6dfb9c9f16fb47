//! Handshake payloads.
//!
//! The Gateway opens every connection with a challenge, and the client answers
//! with a correlated `connect` request:
//!
//! 1. Server pushes `connect.challenge` with a [`Challenge`] payload
//! 2. Client sends `req` method `connect` with [`ConnectParams`]
//! 3. Server replies `res` with a [`HelloPayload::HelloOk`] on success,
//!    or `ok:false` with an error shape on rejection
//!
//! # Main Types
//!
//! - [`Challenge`] - Nonce issued before authentication
//! - [`ConnectParams`] - Protocol bounds, client identity, credentials, scopes
//! - [`HelloPayload`] - Tagged acknowledgment payload
//! - [`HelloOk`] - Negotiated protocol version and server policy

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of the `connect.challenge` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
	/// Server-issued freshness value.
	pub nonce: String,
	/// Server clock at issue time, Unix milliseconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ts: Option<u64>,
}

/// Parameters of the `connect` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
	pub min_protocol: u32,
	pub max_protocol: u32,
	pub client: ClientInfo,
	/// Declared client capabilities.
	#[serde(default)]
	pub caps: Vec<String>,
	/// Commands this client can execute on behalf of the server.
	#[serde(default)]
	pub commands: Vec<String>,
	#[serde(default)]
	pub permissions: Map<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth: Option<ConnectAuth>,
	pub role: String,
	#[serde(default)]
	pub scopes: Vec<String>,
}

/// Client identity announced during `connect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	pub version: String,
	pub platform: String,
	pub mode: String,
	/// Distinguishes several running copies of the same client.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub instance_id: Option<String>,
}

/// Credential payload of `connect`. A token takes precedence over a password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectAuth {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub password: Option<String>,
}

/// Tagged payload of a successful `connect` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HelloPayload {
	#[serde(rename = "hello-ok")]
	HelloOk(HelloOk),
	/// Any tag this client does not recognize.
	#[serde(other)]
	Unknown,
}

/// Acknowledgment body: negotiated protocol and server policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloOk {
	pub protocol: u32,
	#[serde(default)]
	pub server: ServerInfo,
	#[serde(default)]
	pub policy: Policy,
	#[serde(default)]
	pub features: Features,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
	#[serde(default)]
	pub version: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub conn_id: Option<String>,
}

/// Connection policy dictated by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
	/// Interval between `tick` events.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tick_interval_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_payload: Option<usize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_buffered_bytes: Option<usize>,
}

/// Methods and events the server advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
	#[serde(default)]
	pub methods: Vec<String>,
	#[serde(default)]
	pub events: Vec<String>,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn connect_params_use_camel_case() {
		let params = ConnectParams {
			min_protocol: 3,
			max_protocol: 3,
			client: ClientInfo {
				id: "cli".into(),
				display_name: Some("Terminal".into()),
				version: "1.0.0".into(),
				platform: "linux".into(),
				mode: "cli".into(),
				instance_id: None,
			},
			caps: vec![],
			commands: vec![],
			permissions: Map::new(),
			auth: Some(ConnectAuth {
				token: Some("secret".into()),
				password: None,
			}),
			role: "operator".into(),
			scopes: vec!["operator.write".into()],
		};

		let value = serde_json::to_value(&params).unwrap();
		assert_eq!(value["minProtocol"], 3);
		assert_eq!(value["maxProtocol"], 3);
		assert_eq!(value["client"]["displayName"], "Terminal");
		assert!(value["client"].get("instanceId").is_none());
		assert_eq!(value["auth"], json!({"token": "secret"}));
		assert_eq!(value["scopes"][0], "operator.write");
	}

	#[test]
	fn hello_ok_decodes_with_policy() {
		let payload = json!({
			"type": "hello-ok",
			"protocol": 3,
			"server": {"version": "0.4.1", "connId": "c-1"},
			"policy": {"tickIntervalMs": 5000, "maxPayload": 1048576},
			"features": {"methods": ["chat.send"], "events": ["tick"]},
			"snapshot": {"presence": []}
		});

		match serde_json::from_value::<HelloPayload>(payload).unwrap() {
			HelloPayload::HelloOk(hello) => {
				assert_eq!(hello.protocol, 3);
				assert_eq!(hello.server.conn_id.as_deref(), Some("c-1"));
				assert_eq!(hello.policy.tick_interval_ms, Some(5000));
				assert_eq!(hello.features.methods, vec!["chat.send"]);
			}
			HelloPayload::Unknown => panic!("Expected HelloOk"),
		}
	}

	#[test]
	fn unrecognized_hello_tag_is_unknown() {
		let payload = json!({"type": "hello-later", "protocol": 3});
		assert_eq!(serde_json::from_value::<HelloPayload>(payload).unwrap(), HelloPayload::Unknown);
	}

	#[test]
	fn challenge_timestamp_is_optional() {
		let challenge: Challenge = serde_json::from_value(json!({"nonce": "abc"})).unwrap();
		assert_eq!(challenge.nonce, "abc");
		assert_eq!(challenge.ts, None);
	}
}
