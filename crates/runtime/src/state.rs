//! Observable connection state.

use std::fmt;

use gw_protocol::HelloOk;

use crate::error::HandshakeError;

/// Lifecycle phase of a session.
///
/// ```text
/// Disconnected ─► Connecting ─► AwaitingChallenge ─► Authenticating ─► Ready
///                     ▲                                                  │
///                     └──────────────── Reconnecting ◄───────────────────┘
/// any ─► Closed (explicit close or fatal handshake failure; terminal)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
	/// Not started.
	#[default]
	Disconnected,
	/// Opening the transport.
	Connecting,
	/// Transport open, waiting for `connect.challenge`.
	AwaitingChallenge,
	/// `connect` sent, waiting for the hello.
	Authenticating,
	Ready,
	/// Waiting out the backoff delay before the next attempt.
	Reconnecting,
	/// Terminal.
	Closed,
}

impl Phase {
	pub fn as_str(self) -> &'static str {
		match self {
			Phase::Disconnected => "disconnected",
			Phase::Connecting => "connecting",
			Phase::AwaitingChallenge => "awaiting-challenge",
			Phase::Authenticating => "authenticating",
			Phase::Ready => "ready",
			Phase::Reconnecting => "reconnecting",
			Phase::Closed => "closed",
		}
	}

	pub fn is_terminal(self) -> bool {
		self == Phase::Closed
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Snapshot published on every phase transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionState {
	pub phase: Phase,
	/// Bumped on every transport attempt.
	pub generation: u64,
	/// Negotiated protocol version of the current generation.
	pub protocol: Option<u32>,
	pub hello: Option<HelloOk>,
	/// Consecutive failed attempts since the last `Ready`.
	pub reconnect_attempt: u32,
	pub last_error: Option<String>,
	/// Set when the session closed because of a handshake failure.
	pub fatal: Option<HandshakeError>,
}
