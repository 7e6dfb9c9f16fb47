//! Streamed agent output.
//!
//! `agent.event` payloads belong to one logical agent turn (identified by
//! `runId`) and one [`StreamKind`]. Each (run, stream) pair carries its own
//! monotonically increasing `seq`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of an `agent.event` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
	/// Agent turn this event belongs to, usually the idempotency key of the
	/// command that started it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub run_id: Option<String>,
	pub stream: StreamKind,
	pub seq: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ts: Option<u64>,
	#[serde(default)]
	pub data: Value,
}

/// Kind of agent stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StreamKind {
	/// Assistant text tokens.
	Assistant,
	/// Tool-execution phases.
	Tool,
	/// Run start/end markers.
	Lifecycle,
	/// Stream names this client does not model.
	Other(String),
}

impl StreamKind {
	pub fn as_str(&self) -> &str {
		match self {
			StreamKind::Assistant => "assistant",
			StreamKind::Tool => "tool",
			StreamKind::Lifecycle => "lifecycle",
			StreamKind::Other(name) => name,
		}
	}
}

impl From<String> for StreamKind {
	fn from(name: String) -> Self {
		match name.as_str() {
			"assistant" => StreamKind::Assistant,
			"tool" => StreamKind::Tool,
			"lifecycle" => StreamKind::Lifecycle,
			_ => StreamKind::Other(name),
		}
	}
}

impl From<StreamKind> for String {
	fn from(kind: StreamKind) -> Self {
		match kind {
			StreamKind::Other(name) => name,
			known => known.as_str().to_string(),
		}
	}
}

impl fmt::Display for StreamKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn known_streams_decode_to_variants() {
		let event: AgentEvent =
			serde_json::from_value(json!({"stream": "assistant", "seq": 4, "data": {"text": "he"}})).unwrap();
		assert_eq!(event.stream, StreamKind::Assistant);
		assert_eq!(event.seq, 4);
		assert_eq!(event.run_id, None);
		assert_eq!(event.data["text"], "he");
	}

	#[test]
	fn unknown_stream_is_preserved() {
		let event: AgentEvent =
			serde_json::from_value(json!({"runId": "r1", "stream": "thinking", "seq": 1})).unwrap();
		assert_eq!(event.stream, StreamKind::Other("thinking".into()));
		assert_eq!(serde_json::to_value(&event).unwrap()["stream"], "thinking");
	}

	#[test]
	fn missing_seq_is_rejected() {
		assert!(serde_json::from_value::<AgentEvent>(json!({"stream": "tool"})).is_err());
	}
}
