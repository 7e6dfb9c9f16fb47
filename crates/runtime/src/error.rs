//! Error types for the Gateway runtime.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::state::Phase;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a [`Session`](crate::Session).
#[derive(Debug, Error)]
pub enum Error {
	/// Send attempted on a transport that is not open.
	#[error("Transport closed")]
	TransportClosed,

	/// Socket never opened, or failed while open.
	#[error("Transport error: {0}")]
	Transport(String),

	/// Handshake failed; the session will not retry on its own.
	#[error("Handshake failed: {0}")]
	Handshake(#[from] HandshakeError),

	/// No response arrived within the request deadline.
	#[error("Request '{method}' timed out after {timeout_ms}ms")]
	RequestTimeout { method: String, timeout_ms: u64 },

	/// Server answered with `ok:false`.
	#[error("{code}: {message}")]
	Remote {
		code: String,
		message: String,
		/// Server hint that replaying the request may succeed.
		retryable: bool,
		details: Option<Value>,
	},

	/// The connection was lost while the request was in flight. Whether the
	/// server acted on it is unknown.
	#[error("Connection reset before a response arrived")]
	ConnectionReset,

	/// Operation requires a `Ready` connection.
	#[error("Not connected (phase: {phase})")]
	NotConnected { phase: Phase },

	/// `connect` called on a session that is already running.
	#[error("Session already connected")]
	AlreadyConnected,

	/// Session is closed; no further work will be attempted.
	#[error("Session closed")]
	SessionClosed,

	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if repeating the operation later may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Error::TransportClosed
			| Error::Transport(_)
			| Error::RequestTimeout { .. }
			| Error::ConnectionReset
			| Error::NotConnected { .. } => true,
			Error::Remote { retryable, .. } => *retryable,
			_ => false,
		}
	}

	/// Returns true if the session cannot recover from this error.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Error::Handshake(_) | Error::SessionClosed)
	}

	/// Returns true if this is a request timeout.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::RequestTimeout { .. })
	}

	/// Returns the server error code if this is a remote error.
	pub fn remote_code(&self) -> Option<&str> {
		match self {
			Error::Remote { code, .. } => Some(code),
			_ => None,
		}
	}
}

/// Fatal handshake failures. The session closes and does not reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
	/// Challenge event without a usable nonce.
	#[error("malformed challenge: {0}")]
	MalformedChallenge(String),

	/// Server answered `connect` with `ok:false`.
	#[error("connect rejected: {code}: {message}")]
	Rejected { code: String, message: String },

	/// Successful response whose payload is not a recognized hello.
	#[error("unexpected connect payload: {0}")]
	UnexpectedPayload(String),

	/// Server picked a protocol outside the requested range.
	#[error("protocol {negotiated} outside requested range [{min}, {max}]")]
	ProtocolMismatch { negotiated: u32, min: u32, max: u32 },

	/// No hello within the handshake deadline.
	#[error("no hello within {0:?}")]
	Timeout(Duration),
}
