//! WebSocket transport over `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, warn};

use super::{Connector, Outgoing, TransportEvent, TransportParts};
use crate::config::parse_gateway_url;
use crate::error::{Error, Result};

/// Connects to `ws://` and `wss://` Gateways.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
	connect_timeout: Duration,
}

impl WebSocketConnector {
	pub fn new(connect_timeout: Duration) -> Self {
		Self { connect_timeout }
	}
}

impl Default for WebSocketConnector {
	fn default() -> Self {
		Self::new(Duration::from_secs(10))
	}
}

#[async_trait]
impl Connector for WebSocketConnector {
	async fn connect(&self, url: &str) -> Result<TransportParts> {
		let url = parse_gateway_url(url)?;

		let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
			.await
			.map_err(|_| Error::Transport(format!("WebSocket connect timed out after {:?}", self.connect_timeout)))?
			.map_err(|e| Error::Transport(format!("WebSocket connect failed: {e}")))?;

		debug!(url = %url, "WebSocket open");

		let (mut ws_write, mut ws_read) = ws_stream.split();
		let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Outgoing>();
		let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<TransportEvent>();

		tokio::spawn(async move {
			while let Some(outgoing) = outgoing_rx.recv().await {
				match outgoing {
					Outgoing::Text(text) => {
						if let Err(e) = ws_write.send(Message::Text(text)).await {
							warn!(error = %e, "WebSocket write failed");
							break;
						}
					}
					Outgoing::Close { code, reason } => {
						let frame = CloseFrame {
							code: CloseCode::from(code),
							reason: reason.into(),
						};
						let _ = ws_write.send(Message::Close(Some(frame))).await;
						break;
					}
				}
			}
			let _ = ws_write.close().await;
		});

		tokio::spawn(async move {
			let closed = loop {
				let Some(message) = ws_read.next().await else {
					break TransportEvent::Closed {
						code: None,
						reason: "stream ended".to_string(),
					};
				};
				let text = match message {
					Ok(Message::Text(text)) => text,
					Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
						Ok(text) => text,
						Err(_) => {
							warn!("Dropping non-UTF-8 binary frame");
							continue;
						}
					},
					Ok(Message::Close(frame)) => {
						break match frame {
							Some(frame) => TransportEvent::Closed {
								code: Some(u16::from(frame.code)),
								reason: frame.reason.into_owned(),
							},
							None => TransportEvent::Closed {
								code: None,
								reason: String::new(),
							},
						};
					}
					Ok(_) => continue,
					Err(e) => {
						break TransportEvent::Closed {
							code: None,
							reason: e.to_string(),
						};
					}
				};
				if incoming_tx.send(TransportEvent::Frame(text)).is_err() {
					return;
				}
			};
			let _ = incoming_tx.send(closed);
		});

		Ok(TransportParts::new(outgoing_tx, incoming_rx))
	}
}
