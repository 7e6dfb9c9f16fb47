//! Public entry point.

use std::sync::Arc;
use std::time::Duration;

use gw_protocol::{AgentEvent, ChatAbort, ChatSend, EventFrame, Frame, HelloOk, RequestFrame, events, methods};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{Credentials, SessionConfig, parse_gateway_url};
use crate::dispatcher::{EventDispatcher, Subscription};
use crate::error::{Error, Result};
use crate::registry::RequestRegistry;
use crate::state::{ConnectionState, Phase};
use crate::supervisor::{Control, Link, Shared, Supervisor};
use crate::transport::{Connector, WebSocketConnector};

/// Client session with one Gateway.
///
/// Cheap to clone; clones share the connection. The connection is owned by a
/// background task started by [`connect`](Self::connect) that reconnects on
/// its own until [`close`](Self::close) is called, a handshake fails, or the
/// last clone is dropped.
///
/// # Example
///
/// ```ignore
/// let session = Session::new(SessionConfig::default())?;
/// session.connect("wss://gateway.example.com/ws", Credentials::token(token))?;
/// session.ready().await?;
///
/// let _sub = session.subscribe("agent.event", |frame| println!("{}", frame.payload));
/// let (key, ack) = session.chat_send("main", "hello").await?;
/// ```
#[derive(Clone)]
pub struct Session {
	inner: Arc<SessionInner>,
}

struct SessionInner {
	config: Arc<SessionConfig>,
	connector: Arc<dyn Connector>,
	registry: Arc<RequestRegistry>,
	dispatcher: Arc<EventDispatcher>,
	link: Arc<Link>,
	state: Arc<watch::Sender<ConnectionState>>,
	control: Mutex<Option<mpsc::UnboundedSender<Control>>>,
}

impl Session {
	/// Creates a session that connects over WebSocket.
	pub fn new(config: SessionConfig) -> Result<Self> {
		let connector = WebSocketConnector::new(config.connect_timeout());
		Self::with_connector(config, connector)
	}

	/// Creates a session that opens transports through `connector`.
	pub fn with_connector(config: SessionConfig, connector: impl Connector + 'static) -> Result<Self> {
		config.validate()?;
		let (state, _) = watch::channel(ConnectionState::default());
		Ok(Self {
			inner: Arc::new(SessionInner {
				config: Arc::new(config),
				connector: Arc::new(connector),
				registry: Arc::new(RequestRegistry::new()),
				dispatcher: Arc::new(EventDispatcher::new()),
				link: Arc::new(Link::default()),
				state: Arc::new(state),
				control: Mutex::new(None),
			}),
		})
	}

	pub fn config(&self) -> &SessionConfig {
		&self.inner.config
	}

	/// Starts connecting to `url` in the background.
	///
	/// Must be called from within a Tokio runtime. Use [`ready`](Self::ready)
	/// to wait for the handshake.
	///
	/// # Errors
	///
	/// [`Error::InvalidConfig`] for a non-WebSocket URL,
	/// [`Error::AlreadyConnected`] if already started, and
	/// [`Error::SessionClosed`] once closed.
	pub fn connect(&self, url: &str, credentials: Credentials) -> Result<()> {
		parse_gateway_url(url)?;

		let mut control = self.inner.control.lock();
		if self.phase() == Phase::Closed {
			return Err(Error::SessionClosed);
		}
		if control.is_some() {
			return Err(Error::AlreadyConnected);
		}

		let (tx, rx) = mpsc::unbounded_channel();
		let shared = Shared {
			config: Arc::clone(&self.inner.config),
			connector: Arc::clone(&self.inner.connector),
			registry: Arc::clone(&self.inner.registry),
			dispatcher: Arc::clone(&self.inner.dispatcher),
			link: Arc::clone(&self.inner.link),
			state: Arc::clone(&self.inner.state),
		};
		let supervisor = Supervisor::new(url.to_string(), credentials, shared, rx);
		tokio::spawn(supervisor.run());
		*control = Some(tx);
		info!(url, "Session started");
		Ok(())
	}

	/// Waits until the session is `Ready` and returns the server's hello.
	///
	/// # Errors
	///
	/// [`Error::Handshake`] if the session closed on a handshake failure,
	/// [`Error::SessionClosed`] if it was closed, and
	/// [`Error::NotConnected`] if [`connect`](Self::connect) was never called.
	pub async fn ready(&self) -> Result<HelloOk> {
		let mut rx = self.inner.state.subscribe();
		if self.inner.control.lock().is_none() && rx.borrow().phase != Phase::Closed {
			return Err(Error::NotConnected {
				phase: rx.borrow().phase,
			});
		}

		let state = rx
			.wait_for(|state| matches!(state.phase, Phase::Ready | Phase::Closed))
			.await
			.map_err(|_| Error::SessionClosed)?
			.clone();
		match (state.phase, state.hello, state.fatal) {
			(Phase::Ready, Some(hello), _) => Ok(hello),
			(_, _, Some(fatal)) => Err(fatal.into()),
			_ => Err(Error::SessionClosed),
		}
	}

	/// Sends a request and waits for its response, using the configured
	/// request timeout.
	///
	/// Dropping the returned future abandons the request locally; nothing is
	/// sent to the server and a late response is discarded.
	pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
		self.request_with_timeout(method, params, self.inner.config.request_timeout())
			.await
	}

	/// Sends a request and waits up to `timeout` for its response.
	///
	/// # Errors
	///
	/// - [`Error::NotConnected`] unless the session is `Ready`
	/// - [`Error::RequestTimeout`] if no response arrived in time
	/// - [`Error::ConnectionReset`] if the connection dropped first
	/// - [`Error::Remote`] if the server answered `ok:false`
	pub async fn request_with_timeout(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
		// Registered before taking the sender: a teardown racing with us either
		// hides the sender or flushes this call.
		let call = self.inner.registry.register(method);
		let Some(sender) = self.inner.link.sender_if_ready() else {
			return Err(self.not_connected());
		};

		let text = Frame::from(RequestFrame::new(call.id(), method, params)).encode()?;
		debug!(id = %call.id(), method, "Sending request");
		sender.send(text)?;
		call.wait(timeout).await
	}

	/// Typed wrapper over [`request`](Self::request).
	pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
	where
		P: Serialize + ?Sized,
		R: DeserializeOwned,
	{
		let params = serde_json::to_value(params)?;
		let payload = self.request(method, params).await?;
		Ok(serde_json::from_value(payload)?)
	}

	/// Sends a request without waiting for, or tracking, a response.
	pub fn send(&self, method: &str, params: Value) -> Result<()> {
		let Some(sender) = self.inner.link.sender_if_ready() else {
			return Err(self.not_connected());
		};
		let id = self.inner.registry.next_id();
		let text = Frame::from(RequestFrame::new(id.as_str(), method, params)).encode()?;
		debug!(id = %id, method, "Sending fire-and-forget request");
		sender.send(text)
	}

	/// Sends a chat message under a fresh idempotency key.
	///
	/// Returns the key with the server's acknowledgment. After
	/// [`Error::ConnectionReset`], replay with
	/// [`chat_send_with_key`](Self::chat_send_with_key) and the same key.
	pub async fn chat_send(&self, session_key: &str, message: &str) -> Result<(String, Value)> {
		let key = Uuid::new_v4().to_string();
		let ack = self.chat_send_with_key(session_key, message, &key).await?;
		Ok((key, ack))
	}

	pub async fn chat_send_with_key(&self, session_key: &str, message: &str, idempotency_key: &str) -> Result<Value> {
		let params = ChatSend {
			session_key: session_key.to_string(),
			message: message.to_string(),
			idempotency_key: idempotency_key.to_string(),
		};
		self.call(methods::CHAT_SEND, &params).await
	}

	/// Asks the server to stop an agent run.
	pub async fn chat_abort(&self, run_id: &str, reason: Option<&str>) -> Result<Value> {
		let params = ChatAbort {
			run_id: run_id.to_string(),
			reason: reason.map(str::to_string),
		};
		self.call(methods::CHAT_ABORT, &params).await
	}

	/// Registers `handler` for events named `event`.
	///
	/// Subscriptions survive reconnects and last until the returned guard is
	/// dropped.
	pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
	where
		F: Fn(&EventFrame) + Send + Sync + 'static,
	{
		self.inner.dispatcher.subscribe(event, handler)
	}

	/// Registers `handler` for every forwarded event.
	pub fn subscribe_all<F>(&self, handler: F) -> Subscription
	where
		F: Fn(&EventFrame) + Send + Sync + 'static,
	{
		self.inner.dispatcher.subscribe_all(handler)
	}

	/// Registers `handler` for decoded agent events.
	pub fn subscribe_agent<F>(&self, handler: F) -> Subscription
	where
		F: Fn(&AgentEvent) + Send + Sync + 'static,
	{
		self.subscribe(events::AGENT, move |frame| {
			if let Ok(event) = serde_json::from_value::<AgentEvent>(frame.payload.clone()) {
				handler(&event);
			}
		})
	}

	/// Current connection snapshot.
	pub fn state(&self) -> ConnectionState {
		self.inner.state.borrow().clone()
	}

	/// Receiver notified on every state change.
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.inner.state.subscribe()
	}

	pub fn phase(&self) -> Phase {
		self.inner.state.borrow().phase
	}

	/// Requests awaiting a response.
	pub fn pending_requests(&self) -> usize {
		self.inner.registry.len()
	}

	/// Drops the current transport and reconnects immediately.
	///
	/// In-flight requests fail with [`Error::ConnectionReset`].
	///
	/// # Errors
	///
	/// [`Error::SessionClosed`] once closed, including after a handshake
	/// failure; [`Error::NotConnected`] if never started.
	pub fn reconnect(&self) -> Result<()> {
		let phase = self.phase();
		if phase == Phase::Closed {
			return Err(Error::SessionClosed);
		}
		let control = self.inner.control.lock();
		let Some(control) = control.as_ref() else {
			return Err(Error::NotConnected { phase });
		};
		control.send(Control::Reconnect).map_err(|_| Error::SessionClosed)
	}

	/// Closes the session for good.
	///
	/// Pending requests fail with [`Error::SessionClosed`]. Returns once the
	/// session is `Closed`; calling it again is a no-op.
	pub async fn close(&self) {
		let control = {
			let control = self.inner.control.lock();
			if control.is_none() {
				self.inner.registry.flush(|| Error::SessionClosed);
				self.mark_closed();
				return;
			}
			control.clone()
		};

		if let Some(control) = control {
			let (ack, done) = oneshot::channel();
			if control.send(Control::Close(ack)).is_ok() {
				let _ = done.await;
			} else {
				self.mark_closed();
			}
		}
		let mut rx = self.inner.state.subscribe();
		let _ = rx.wait_for(|state| state.phase == Phase::Closed).await;
	}

	fn mark_closed(&self) {
		self.inner.state.send_if_modified(|state| {
			if state.phase == Phase::Closed {
				return false;
			}
			state.phase = Phase::Closed;
			true
		});
	}

	fn not_connected(&self) -> Error {
		match self.phase() {
			Phase::Closed => Error::SessionClosed,
			phase => Error::NotConnected { phase },
		}
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.borrow();
		f.debug_struct("Session")
			.field("phase", &state.phase)
			.field("generation", &state.generation)
			.field("pending", &self.inner.registry.len())
			.finish()
	}
}
