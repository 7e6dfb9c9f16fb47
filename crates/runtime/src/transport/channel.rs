//! In-process transport.
//!
//! [`ChannelConnector`] pairs every `connect` with a [`ChannelPeer`] handed to
//! the matching [`ChannelAcceptor`]. The peer plays the Gateway side: it
//! reads the client's frames and pushes responses and events back. Useful for
//! embedding a Gateway in the same process and for driving a session in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use gw_protocol::Frame;
use tokio::sync::mpsc;

use super::{Connector, Outgoing, TransportEvent, TransportParts};
use crate::error::{Error, Result};

/// Connector side of an in-process transport pair.
#[derive(Debug, Clone)]
pub struct ChannelConnector {
	peers: mpsc::UnboundedSender<ChannelPeer>,
	refuse: Arc<AtomicBool>,
}

/// Receives one [`ChannelPeer`] per accepted connection.
#[derive(Debug)]
pub struct ChannelAcceptor {
	peers: mpsc::UnboundedReceiver<ChannelPeer>,
	refuse: Arc<AtomicBool>,
}

impl ChannelConnector {
	pub fn new() -> (Self, ChannelAcceptor) {
		let (tx, rx) = mpsc::unbounded_channel();
		let refuse = Arc::new(AtomicBool::new(false));
		(
			Self {
				peers: tx,
				refuse: Arc::clone(&refuse),
			},
			ChannelAcceptor { peers: rx, refuse },
		)
	}
}

#[async_trait]
impl Connector for ChannelConnector {
	async fn connect(&self, url: &str) -> Result<TransportParts> {
		if self.refuse.load(Ordering::SeqCst) {
			return Err(Error::Transport(format!("connection to {url} refused")));
		}

		let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
		let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

		let peer = ChannelPeer {
			url: url.to_string(),
			from_client: outgoing_rx,
			to_client: incoming_tx,
			client_closed: None,
		};
		self.peers
			.send(peer)
			.map_err(|_| Error::Transport(format!("no gateway accepting at {url}")))?;

		Ok(TransportParts::new(outgoing_tx, incoming_rx))
	}
}

impl ChannelAcceptor {
	/// Waits for the next client connection.
	pub async fn accept(&mut self) -> Option<ChannelPeer> {
		self.peers.recv().await
	}

	/// While set, `connect` fails as if the Gateway were unreachable.
	pub fn refuse_connections(&self, refuse: bool) {
		self.refuse.store(refuse, Ordering::SeqCst);
	}
}

/// Gateway end of one in-process connection.
#[derive(Debug)]
pub struct ChannelPeer {
	url: String,
	from_client: mpsc::UnboundedReceiver<Outgoing>,
	to_client: mpsc::UnboundedSender<TransportEvent>,
	client_closed: Option<(u16, String)>,
}

impl ChannelPeer {
	/// URL the client asked for.
	pub fn url(&self) -> &str {
		&self.url
	}

	/// Pushes one frame to the client.
	pub fn send(&self, frame: impl Into<Frame>) -> Result<()> {
		let text = frame.into().encode()?;
		self.send_text(text)
	}

	/// Pushes raw text to the client, bypassing encoding.
	pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
		self.to_client
			.send(TransportEvent::Frame(text.into()))
			.map_err(|_| Error::TransportClosed)
	}

	/// Reports closure to the client.
	pub fn close(&self, code: u16, reason: &str) {
		let _ = self.to_client.send(TransportEvent::Closed {
			code: Some(code),
			reason: reason.to_string(),
		});
	}

	/// Waits for the next frame written by the client.
	///
	/// Returns `None` once the client closed or dropped the transport;
	/// undecodable text is surfaced as [`Frame::Unknown`].
	pub async fn recv(&mut self) -> Option<Frame> {
		if self.client_closed.is_some() {
			return None;
		}
		match self.from_client.recv().await? {
			Outgoing::Text(text) => Some(Frame::decode(&text).unwrap_or(Frame::Unknown)),
			Outgoing::Close { code, reason } => {
				self.client_closed = Some((code, reason));
				None
			}
		}
	}

	/// Close code and reason sent by the client, once observed by [`recv`](Self::recv).
	pub fn client_close(&self) -> Option<(u16, &str)> {
		self.client_closed.as_ref().map(|(code, reason)| (*code, reason.as_str()))
	}

	/// Returns true if the client side has dropped its receiver.
	pub fn is_client_gone(&self) -> bool {
		self.to_client.is_closed()
	}
}
