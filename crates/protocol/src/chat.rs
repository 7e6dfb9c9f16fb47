//! Chat command parameters.

use serde::{Deserialize, Serialize};

/// Parameters of `chat.send`.
///
/// The idempotency key lets a caller replay the command after a connection
/// reset without the server running it twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSend {
	pub session_key: String,
	pub message: String,
	pub idempotency_key: String,
}

/// Parameters of `chat.abort`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAbort {
	pub run_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}
