//! Frame envelopes.
//!
//! One [`Frame`] per socket message. The `type` tag selects the variant:
//!
//! - `req`: [`RequestFrame`], client to server, carries a client-chosen `id`
//! - `res`: [`ResponseFrame`], server to client, echoes the request `id`
//! - `event`: [`EventFrame`], server push, uncorrelated
//!
//! Frames with any other `type` decode to [`Frame::Unknown`] so a newer server
//! cannot break an older client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
	/// Correlated command.
	Req(RequestFrame),
	/// Reply to a [`RequestFrame`] with the same `id`.
	Res(ResponseFrame),
	/// Server-pushed event.
	Event(EventFrame),
	/// Forward-compatible catch-all for unrecognized `type` tags.
	#[serde(other)]
	Unknown,
}

impl Frame {
	/// Decodes a frame from its text encoding.
	pub fn decode(text: &str) -> serde_json::Result<Self> {
		serde_json::from_str(text)
	}

	/// Encodes the frame as a single JSON text message.
	pub fn encode(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}
}

/// Outbound command `{type:"req", id, method, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
	/// Client-generated identifier, unique among pending requests.
	pub id: String,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

impl RequestFrame {
	pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
		Self {
			id: id.into(),
			method: method.into(),
			params,
		}
	}
}

impl From<RequestFrame> for Frame {
	fn from(frame: RequestFrame) -> Self {
		Frame::Req(frame)
	}
}

/// Reply `{type:"res", id, ok, payload?, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
	pub id: String,
	pub ok: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorShape>,
}

impl ResponseFrame {
	/// Successful response carrying `payload`.
	pub fn success(id: impl Into<String>, payload: Value) -> Self {
		Self {
			id: id.into(),
			ok: true,
			payload: Some(payload),
			error: None,
		}
	}

	/// Failed response carrying `error`.
	pub fn failure(id: impl Into<String>, error: ErrorShape) -> Self {
		Self {
			id: id.into(),
			ok: false,
			payload: None,
			error: Some(error),
		}
	}
}

impl From<ResponseFrame> for Frame {
	fn from(frame: ResponseFrame) -> Self {
		Frame::Res(frame)
	}
}

/// Error details attached to an `ok:false` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
	/// Machine-readable code (e.g. `"INVALID_REQUEST"`, `"UNAUTHORIZED"`).
	pub code: String,
	pub message: String,
	/// Server hint that replaying the same request may succeed.
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub retryable: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

impl ErrorShape {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			code: code.into(),
			message: message.into(),
			retryable: false,
			details: None,
		}
	}
}

/// Server push `{type:"event", event, payload, seq?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
	/// Event name, e.g. `"tick"` or `"agent.event"`.
	pub event: String,
	#[serde(default)]
	pub payload: Value,
	/// Connection-wide broadcast sequence, when the server assigns one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub seq: Option<u64>,
}

impl EventFrame {
	pub fn new(event: impl Into<String>, payload: Value) -> Self {
		Self {
			event: event.into(),
			payload,
			seq: None,
		}
	}
}

impl From<EventFrame> for Frame {
	fn from(frame: EventFrame) -> Self {
		Frame::Event(frame)
	}
}
