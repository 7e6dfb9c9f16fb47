//! Frame transport.
//!
//! A [`Connector`] opens one channel per connection generation and hands back
//! [`TransportParts`]:
//!
//! - [`TransportSender`]: cloneable handle for outbound text frames and close
//! - [`TransportReceiver`]: the single consumer of inbound [`TransportEvent`]s
//!
//! The receiver is not cloneable, so exactly one owner processes frames.
//! It yields [`TransportEvent::Closed`] at most once, then `None`, even if the
//! underlying socket reports closure several times or vanishes silently.

mod channel;
mod websocket;


use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use channel::{ChannelAcceptor, ChannelConnector, ChannelPeer};
pub use websocket::WebSocketConnector;

use crate::error::{Error, Result};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Policy violation, used when the handshake fails.
pub const CLOSE_POLICY: u16 = 1008;
/// Application-defined: heartbeat went stale.
pub const CLOSE_STALE: u16 = 4000;
/// Application-defined: reconnect requested by the client.
pub const CLOSE_RECONNECT: u16 = 4001;

/// Opens transports to a Gateway.
#[async_trait]
pub trait Connector: Send + Sync {
	/// Opens a channel to `url`, returning once it is usable.
	async fn connect(&self, url: &str) -> Result<TransportParts>;
}

/// Inbound item delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	/// One encoded frame.
	Frame(String),
	/// The channel closed. `code` is absent when no close frame was seen.
	Closed { code: Option<u16>, reason: String },
}

/// Outbound item consumed by a transport's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
	Text(String),
	Close { code: u16, reason: String },
}

/// Both halves of an open transport.
pub struct TransportParts {
	pub sender: TransportSender,
	pub receiver: TransportReceiver,
}

impl TransportParts {
	/// Builds the halves around a writer queue and an inbound queue.
	///
	/// `outgoing_tx` feeds whatever task writes to the socket; `incoming_rx`
	/// is fed by whatever task reads from it.
	pub fn new(outgoing_tx: mpsc::UnboundedSender<Outgoing>, incoming_rx: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
		let closed = Arc::new(AtomicBool::new(false));
		Self {
			sender: TransportSender {
				tx: outgoing_tx,
				closed: Arc::clone(&closed),
			},
			receiver: TransportReceiver {
				rx: incoming_rx,
				closed,
				close_delivered: false,
			},
		}
	}
}

/// Outbound half of a transport.
#[derive(Debug, Clone)]
pub struct TransportSender {
	tx: mpsc::UnboundedSender<Outgoing>,
	closed: Arc<AtomicBool>,
}

impl TransportSender {
	/// Queues one text frame.
	///
	/// # Errors
	///
	/// Returns [`Error::TransportClosed`] once the transport is closed.
	pub fn send(&self, text: String) -> Result<()> {
		if self.is_closed() {
			return Err(Error::TransportClosed);
		}
		self.tx.send(Outgoing::Text(text)).map_err(|_| {
			self.closed.store(true, Ordering::SeqCst);
			Error::TransportClosed
		})
	}

	/// Closes the transport. Only the first call has any effect.
	pub fn close(&self, code: u16, reason: &str) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		let _ = self.tx.send(Outgoing::Close {
			code,
			reason: reason.to_string(),
		});
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
	}
}

/// Inbound half of a transport. Exactly one exists per transport.
#[derive(Debug)]
pub struct TransportReceiver {
	rx: mpsc::UnboundedReceiver<TransportEvent>,
	closed: Arc<AtomicBool>,
	close_delivered: bool,
}

impl TransportReceiver {
	/// Waits for the next inbound event.
	///
	/// Returns `Closed` exactly once (synthesized if the reader vanished
	/// without reporting), and `None` on every call after that.
	pub async fn recv(&mut self) -> Option<TransportEvent> {
		if self.close_delivered {
			return None;
		}
		let event = match self.rx.recv().await {
			Some(event) => event,
			None => TransportEvent::Closed {
				code: None,
				reason: "transport dropped".to_string(),
			},
		};
		if matches!(event, TransportEvent::Closed { .. }) {
			self.close_delivered = true;
			self.closed.store(true, Ordering::SeqCst);
			self.rx.close();
		}
		Some(event)
	}
}
