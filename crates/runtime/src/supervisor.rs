//! Connection lifecycle actor.
//!
//! One [`Supervisor`] task owns the transport for the whole life of a
//! session. Each loop iteration is one connection generation: open the
//! transport, answer the challenge, serve frames until the link dies, then
//! wait out the backoff and start over. Every timer (handshake deadline,
//! heartbeat staleness, backoff sleep) lives inside that iteration, so
//! nothing scheduled for one generation can fire in the next.
//!
//! The receiver of a generation is dropped before the next one opens, and
//! [`Link`] only hands out the sender of the current ready generation, so
//! frames from a superseded transport can neither arrive nor be sent.

use std::sync::Arc;

use gw_protocol::{Frame, HelloOk, RequestFrame, events, methods};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::config::{Credentials, SessionConfig};
use crate::dispatcher::{Dispatch, EventDispatcher};
use crate::error::{Error, HandshakeError, Result};
use crate::handshake::{ChallengeOutcome, HandshakeNegotiator};
use crate::registry::{PendingCall, RequestRegistry};
use crate::state::{ConnectionState, Phase};
use crate::transport::{
	CLOSE_NORMAL, CLOSE_POLICY, CLOSE_RECONNECT, CLOSE_STALE, Connector, TransportEvent, TransportParts, TransportSender,
};

/// Commands from the session to its supervisor.
#[derive(Debug)]
pub(crate) enum Control {
	/// Stop for good; the sender is notified once `Closed` is published.
	Close(oneshot::Sender<()>),
	/// Drop the current transport and reconnect without waiting.
	Reconnect,
}

/// Sender of the live generation, shared with request issuers.
#[derive(Debug, Default)]
pub(crate) struct Link {
	slot: Mutex<Option<LinkSlot>>,
}

#[derive(Debug)]
struct LinkSlot {
	generation: u64,
	sender: TransportSender,
	ready: bool,
}

impl Link {
	fn attach(&self, generation: u64, sender: TransportSender) {
		*self.slot.lock() = Some(LinkSlot {
			generation,
			sender,
			ready: false,
		});
	}

	fn mark_ready(&self, generation: u64) {
		if let Some(slot) = self.slot.lock().as_mut().filter(|slot| slot.generation == generation) {
			slot.ready = true;
		}
	}

	fn detach(&self) -> Option<TransportSender> {
		self.slot.lock().take().map(|slot| slot.sender)
	}

	/// Sender usable for application requests, if the link is ready.
	pub(crate) fn sender_if_ready(&self) -> Option<TransportSender> {
		self.slot
			.lock()
			.as_ref()
			.filter(|slot| slot.ready)
			.map(|slot| slot.sender.clone())
	}
}

/// Handles shared between a session and its supervisor.
pub(crate) struct Shared {
	pub(crate) config: Arc<SessionConfig>,
	pub(crate) connector: Arc<dyn Connector>,
	pub(crate) registry: Arc<RequestRegistry>,
	pub(crate) dispatcher: Arc<EventDispatcher>,
	pub(crate) link: Arc<Link>,
	pub(crate) state: Arc<watch::Sender<ConnectionState>>,
}

/// How a generation ended.
enum GenerationExit {
	/// Close requested, or the session was dropped.
	Closed(Option<oneshot::Sender<()>>),
	/// Handshake failed; retrying cannot help.
	Fatal(HandshakeError),
	/// Transport lost or heartbeat stale.
	Lost(String),
	/// Reconnect requested by the session; skips the backoff.
	Restart,
}

pub(crate) struct Supervisor {
	url: String,
	shared: Shared,
	control: mpsc::UnboundedReceiver<Control>,
	negotiator: HandshakeNegotiator,
	backoff: Backoff,
	generation: u64,
}

impl Supervisor {
	pub(crate) fn new(
		url: String,
		credentials: Credentials,
		shared: Shared,
		control: mpsc::UnboundedReceiver<Control>,
	) -> Self {
		let negotiator = HandshakeNegotiator::new(Arc::clone(&shared.config), credentials);
		let backoff = Backoff::new(shared.config.backoff.clone());
		Self {
			url,
			shared,
			control,
			negotiator,
			backoff,
			generation: 0,
		}
	}

	pub(crate) async fn run(mut self) {
		loop {
			match self.run_generation().await {
				GenerationExit::Closed(ack) => {
					self.finish(None, ack);
					return;
				}
				GenerationExit::Fatal(fatal) => {
					error!(generation = self.generation, error = %fatal, "Handshake failed; not retrying");
					self.finish(Some(fatal), None);
					return;
				}
				GenerationExit::Restart => {
					self.teardown(CLOSE_RECONNECT, "reconnect requested", || Error::ConnectionReset);
					info!(generation = self.generation, "Reconnecting on request");
					self.publish(|state| {
						state.phase = Phase::Reconnecting;
						state.protocol = None;
						state.hello = None;
					});
				}
				GenerationExit::Lost(reason) => {
					self.teardown(CLOSE_NORMAL, &reason, || Error::ConnectionReset);

					let delay = self.backoff.next_delay();
					let attempt = self.backoff.attempt();
					warn!(
						generation = self.generation,
						attempt,
						delay_ms = delay.as_millis() as u64,
						reason = %reason,
						"Connection lost; reconnecting"
					);
					self.publish(|state| {
						state.phase = Phase::Reconnecting;
						state.protocol = None;
						state.hello = None;
						state.reconnect_attempt = attempt;
						state.last_error = Some(reason);
					});

					tokio::select! {
						_ = sleep(delay) => {}
						control = self.control.recv() => match control {
							Some(Control::Reconnect) => debug!("Reconnect requested; skipping backoff"),
							Some(Control::Close(ack)) => {
								self.finish(None, Some(ack));
								return;
							}
							None => {
								self.finish(None, None);
								return;
							}
						}
					}
				}
			}
		}
	}

	async fn run_generation(&mut self) -> GenerationExit {
		self.generation += 1;
		let generation = self.generation;
		self.publish(|state| {
			state.phase = Phase::Connecting;
			state.generation = generation;
		});
		info!(generation, url = %self.url, "Connecting to gateway");

		let TransportParts { sender, mut receiver } = match self.open().await {
			Ok(parts) => parts,
			Err(exit) => return exit,
		};
		self.shared.link.attach(generation, sender.clone());
		self.publish(|state| state.phase = Phase::AwaitingChallenge);
		debug!(generation, "Transport open; awaiting challenge");

		let handshake_timeout = self.shared.config.handshake_timeout();
		let handshake_deadline = sleep(handshake_timeout);
		let stale = sleep(self.shared.config.stale_after(None));
		tokio::pin!(handshake_deadline, stale);

		let mut connect_call: Option<PendingCall> = None;
		let mut tick_interval_ms: Option<u64> = None;
		let mut ready = false;

		loop {
			tokio::select! {
				biased;

				control = self.control.recv() => match control {
					Some(Control::Reconnect) => {
						sender.close(CLOSE_RECONNECT, "reconnect requested");
						return GenerationExit::Restart;
					}
					Some(Control::Close(ack)) => {
						sender.close(CLOSE_NORMAL, "client closed");
						return GenerationExit::Closed(Some(ack));
					}
					None => {
						sender.close(CLOSE_NORMAL, "client dropped");
						return GenerationExit::Closed(None);
					}
				},

				result = await_hello(&mut connect_call), if connect_call.is_some() => {
					connect_call = None;
					match self.negotiator.complete(result) {
						Ok(hello) => {
							ready = true;
							tick_interval_ms = hello.policy.tick_interval_ms;
							stale.as_mut().reset(Instant::now() + self.shared.config.stale_after(tick_interval_ms));
							self.on_ready(generation, hello);
						}
						Err(Error::Handshake(fatal)) => {
							sender.close(CLOSE_POLICY, "handshake failed");
							return GenerationExit::Fatal(fatal);
						}
						Err(other) => return GenerationExit::Lost(other.to_string()),
					}
				},

				event = receiver.recv() => match event {
					Some(TransportEvent::Frame(text)) => {
						if ready {
							let deadline = Instant::now() + self.shared.config.stale_after(tick_interval_ms);
							stale.as_mut().reset(deadline);
						}
						if let Err(exit) = self.handle_frame(&text, ready, &sender, &mut connect_call) {
							return exit;
						}
					}
					Some(TransportEvent::Closed { code, reason }) => {
						let code = code.map_or_else(|| "none".to_string(), |c| c.to_string());
						return GenerationExit::Lost(format!("transport closed (code {code}): {reason}"));
					}
					None => return GenerationExit::Lost("transport closed".to_string()),
				},

				_ = &mut handshake_deadline, if !ready => {
					warn!(generation, "Handshake did not complete in time");
					sender.close(CLOSE_POLICY, "handshake timeout");
					return GenerationExit::Fatal(HandshakeError::Timeout(handshake_timeout));
				},

				_ = &mut stale, if ready => {
					let window = self.shared.config.stale_after(tick_interval_ms);
					warn!(generation, window_ms = window.as_millis() as u64, "No frames received; heartbeat stale");
					sender.close(CLOSE_STALE, "heartbeat stale");
					return GenerationExit::Lost("heartbeat stale".to_string());
				},
			}
		}
	}

	/// Opens the transport, still honoring control messages.
	async fn open(&mut self) -> std::result::Result<TransportParts, GenerationExit> {
		let connect = self.shared.connector.connect(&self.url);
		tokio::pin!(connect);
		loop {
			tokio::select! {
				result = &mut connect => {
					return result.map_err(|e| GenerationExit::Lost(e.to_string()));
				}
				control = self.control.recv() => match control {
					Some(Control::Reconnect) => debug!("Reconnect requested while connecting; ignoring"),
					Some(Control::Close(ack)) => return Err(GenerationExit::Closed(Some(ack))),
					None => return Err(GenerationExit::Closed(None)),
				},
			}
		}
	}

	fn handle_frame(
		&mut self,
		text: &str,
		ready: bool,
		sender: &TransportSender,
		connect_call: &mut Option<PendingCall>,
	) -> std::result::Result<(), GenerationExit> {
		let generation = self.generation;
		let frame = match Frame::decode(text) {
			Ok(frame) => frame,
			Err(e) => {
				warn!(generation, error = %e, "Dropping undecodable frame");
				return Ok(());
			}
		};

		match frame {
			Frame::Res(response) => {
				self.shared.registry.resolve(response);
			}
			Frame::Event(event) if event.event == events::CONNECT_CHALLENGE => {
				if ready {
					debug!(generation, "Ignoring challenge on a ready connection");
					return Ok(());
				}
				let outcome = self
					.negotiator
					.on_challenge(&event.payload)
					.map_err(GenerationExit::Fatal)?;
				match outcome {
					ChallengeOutcome::Duplicate => {
						debug!(generation, "Ignoring repeated challenge");
					}
					ChallengeOutcome::Fresh | ChallengeOutcome::Restart => {
						if outcome == ChallengeOutcome::Restart {
							info!(generation, "Challenge replaced; restarting handshake");
						}
						// Abandon the superseded attempt so its response is dropped.
						*connect_call = None;
						let call = self
							.send_connect(sender)
							.map_err(|e| GenerationExit::Lost(e.to_string()))?;
						*connect_call = Some(call);
						self.publish(|state| state.phase = Phase::Authenticating);
					}
				}
			}
			Frame::Event(event) => {
				if !ready {
					debug!(generation, event = %event.event, "Dropping event received before ready");
					return Ok(());
				}
				if event.event == events::TICK {
					debug!(generation, "Tick");
				}
				if let Dispatch::Delivered(count) = self.shared.dispatcher.dispatch(&event) {
					debug!(generation, event = %event.event, handlers = count, "Event dispatched");
				}
			}
			Frame::Req(request) => {
				debug!(generation, id = %request.id, method = %request.method, "Ignoring server-initiated request");
			}
			Frame::Unknown => {
				warn!(generation, "Skipping frame with unknown type");
			}
		}
		Ok(())
	}

	fn send_connect(&self, sender: &TransportSender) -> Result<PendingCall> {
		let params = serde_json::to_value(self.negotiator.connect_params())?;
		let call = self.shared.registry.register(methods::CONNECT);
		let text = Frame::from(RequestFrame::new(call.id(), methods::CONNECT, params)).encode()?;
		sender.send(text)?;
		debug!(generation = self.generation, id = %call.id(), "Sent connect");
		Ok(call)
	}

	fn on_ready(&mut self, generation: u64, hello: HelloOk) {
		self.backoff.reset();
		self.shared.link.mark_ready(generation);
		info!(
			generation,
			protocol = hello.protocol,
			tick_interval_ms = ?hello.policy.tick_interval_ms,
			"Gateway session ready"
		);
		self.publish(|state| {
			state.phase = Phase::Ready;
			state.protocol = Some(hello.protocol);
			state.hello = Some(hello);
			state.reconnect_attempt = 0;
			state.last_error = None;
		});
	}

	/// Releases everything bound to the ended generation.
	///
	/// The link goes first so no new request can reach the old transport
	/// once pending ones start failing.
	fn teardown(&mut self, code: u16, reason: &str, error: impl Fn() -> Error) {
		if let Some(sender) = self.shared.link.detach() {
			sender.close(code, reason);
		}
		let flushed = self.shared.registry.flush(error);
		if flushed > 0 {
			debug!(generation = self.generation, flushed, "Rejected pending requests");
		}
		self.negotiator.reset();
		self.shared.dispatcher.reset_streams();
	}

	fn finish(&mut self, fatal: Option<HandshakeError>, ack: Option<oneshot::Sender<()>>) {
		self.teardown(CLOSE_NORMAL, "client closed", || Error::SessionClosed);
		info!(generation = self.generation, "Session closed");
		self.publish(|state| {
			state.phase = Phase::Closed;
			state.protocol = None;
			state.hello = None;
			state.last_error = fatal.as_ref().map(ToString::to_string);
			state.fatal = fatal;
		});
		if let Some(ack) = ack {
			let _ = ack.send(());
		}
	}

	fn publish(&self, update: impl FnOnce(&mut ConnectionState)) {
		self.shared.state.send_modify(update);
	}
}

/// Resolves with the `connect` response, or never if none is in flight.
async fn await_hello(call: &mut Option<PendingCall>) -> Result<Value> {
	match call {
		Some(call) => call.await,
		None => std::future::pending().await,
	}
}
