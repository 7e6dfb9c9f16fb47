//! Wire types for the Gateway socket protocol.
//!
//! This crate contains the serde-serializable types exchanged with a Gateway
//! server over a message-oriented socket. Every frame is one JSON object whose
//! `type` field selects one of three shapes: a correlated request (`req`), its
//! response (`res`), or a server-pushed event (`event`).
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization
//! - **Tagged**: String-tagged unions become enums with exhaustive matching
//! - **Lenient on input**: Unknown fields are ignored, unknown tags decode to
//!   catch-all variants instead of failing the whole frame
//!
//! Session lifecycle, correlation and dispatch live in `gw-runtime`.

pub mod agent;
pub mod chat;
pub mod frame;
pub mod handshake;

pub use agent::*;
pub use chat::*;
pub use frame::*;
pub use handshake::*;

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u32 = 3;

/// Event names pushed by the Gateway.
pub mod events {
	/// Pre-authentication challenge carrying a nonce.
	pub const CONNECT_CHALLENGE: &str = "connect.challenge";
	/// Periodic heartbeat.
	pub const TICK: &str = "tick";
	/// Streamed agent output (assistant text, tool phases, lifecycle markers).
	pub const AGENT: &str = "agent.event";
}

/// Method names understood by the Gateway.
pub mod methods {
	pub const CONNECT: &str = "connect";
	pub const CHAT_SEND: &str = "chat.send";
	pub const CHAT_ABORT: &str = "chat.abort";
}
