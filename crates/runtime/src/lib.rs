//! Gateway Runtime - Session lifecycle, correlation, and event dispatch
//!
//! This crate owns one logical connection to a Gateway server and everything
//! multiplexed over it:
//!
//! - **Transport**: WebSocket or in-process frame channels
//! - **Handshake**: Challenge/`connect`/hello negotiation
//! - **Registry**: Request/response correlation with timeouts
//! - **Dispatcher**: Event subscriptions with per-stream sequence checks
//! - **Supervisor**: Heartbeat staleness and backoff reconnection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Session    │  Commands in, events and phase changes out
//! └──────┬───────┘
//!        │ control
//! ┌──────▼───────┐
//! │  Supervisor  │  One task, one live transport generation
//! │  ┌────────┐  │
//! │  │ Hshake │  │  Pre-ready frames
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │Registry│  │  `res` frames
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │Dispatch│  │  `event` frames
//! │  └────────┘  │
//! └──────┬───────┘
//!        │ Connector
//! ┌──────▼───────┐
//! │  Transport   │
//! └──────────────┘
//! ```

pub mod backoff;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod registry;
pub mod session;
pub mod state;
mod supervisor;
pub mod transport;

// Re-export key types at crate root
pub use backoff::Backoff;
pub use config::{BackoffConfig, ClientConfig, Credentials, SessionConfig, parse_gateway_url};
pub use dispatcher::{Dispatch, EventDispatcher, EventHandler, HandlerId, Subscription};
pub use error::{Error, HandshakeError, Result};
pub use handshake::{ChallengeOutcome, ChallengeState, HandshakeNegotiator};
pub use registry::{PendingCall, RequestRegistry};
pub use session::Session;
pub use state::{ConnectionState, Phase};
pub use transport::{
	ChannelAcceptor, ChannelConnector, ChannelPeer, Connector, TransportEvent, TransportParts, TransportReceiver,
	TransportSender, WebSocketConnector,
};
