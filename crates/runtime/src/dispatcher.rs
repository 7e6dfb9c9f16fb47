//! Event routing.
//!
//! Handlers subscribe by event name (or to everything) and are invoked in
//! registration order. Each handler runs inside its own unwind boundary, so a
//! panicking handler never starves the ones after it.
//!
//! `agent.event` pushes pass a per-stream sequence check first: an event whose
//! `seq` is not greater than the last accepted `seq` for the same run and
//! stream kind is dropped as a duplicate.


use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use gw_protocol::{AgentEvent, EventFrame, StreamKind, events};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Unique identifier for event handlers.
pub type HandlerId = u64;

/// Handler invoked with each matching event.
pub type EventHandler = Arc<dyn Fn(&EventFrame) + Send + Sync>;

struct HandlerEntry {
	/// `None` subscribes to every event.
	event: Option<String>,
	handler: EventHandler,
}

impl HandlerEntry {
	fn matches(&self, name: &str) -> bool {
		self.event.as_deref().is_none_or(|event| event == name)
	}
}

/// Handler storage: [`IndexMap`] keeps registration order across removals.
type HandlerMap = Arc<Mutex<IndexMap<HandlerId, HandlerEntry>>>;

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
	/// Delivered to this many handlers (possibly zero).
	Delivered(usize),
	/// Dropped by the sequence check.
	Duplicate,
	/// `agent.event` payload that does not decode.
	Malformed,
}

/// Routes pushed events to subscribers.
pub struct EventDispatcher {
	next_id: AtomicU64,
	handlers: HandlerMap,
	streams: Mutex<StreamTracker>,
}

impl Default for EventDispatcher {
	fn default() -> Self {
		Self::new()
	}
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self {
			next_id: AtomicU64::new(1),
			handlers: Arc::new(Mutex::new(IndexMap::new())),
			streams: Mutex::new(StreamTracker::default()),
		}
	}

	/// Subscribes `handler` to events named `event`.
	pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
	where
		F: Fn(&EventFrame) + Send + Sync + 'static,
	{
		self.insert(Some(event.to_string()), Arc::new(handler))
	}

	/// Subscribes `handler` to every forwarded event.
	pub fn subscribe_all<F>(&self, handler: F) -> Subscription
	where
		F: Fn(&EventFrame) + Send + Sync + 'static,
	{
		self.insert(None, Arc::new(handler))
	}

	fn insert(&self, event: Option<String>, handler: EventHandler) -> Subscription {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		self.handlers.lock().insert(id, HandlerEntry { event, handler });
		Subscription::from_handler_map(id, &self.handlers)
	}

	/// Number of live subscriptions.
	pub fn handler_count(&self) -> usize {
		self.handlers.lock().len()
	}

	/// Delivers `frame` to every matching handler.
	pub fn dispatch(&self, frame: &EventFrame) -> Dispatch {
		if frame.event == events::AGENT {
			let agent = match serde_json::from_value::<AgentEvent>(frame.payload.clone()) {
				Ok(agent) => agent,
				Err(e) => {
					warn!(error = %e, "Dropping malformed agent event");
					return Dispatch::Malformed;
				}
			};
			if !self.streams.lock().accept(&agent) {
				debug!(
					run_id = agent.run_id.as_deref().unwrap_or(""),
					stream = %agent.stream,
					seq = agent.seq,
					"Dropping duplicate or out-of-order agent event"
				);
				return Dispatch::Duplicate;
			}
		}

		// Snapshot so handlers may subscribe or unsubscribe while running.
		let targets: Vec<(HandlerId, EventHandler)> = self
			.handlers
			.lock()
			.iter()
			.filter(|(_, entry)| entry.matches(&frame.event))
			.map(|(id, entry)| (*id, Arc::clone(&entry.handler)))
			.collect();

		for (id, handler) in &targets {
			if catch_unwind(AssertUnwindSafe(|| handler(frame))).is_err() {
				warn!(handler = id, event = %frame.event, "Event handler panicked");
			}
		}
		Dispatch::Delivered(targets.len())
	}

	/// Forgets every stream's last accepted sequence.
	pub fn reset_streams(&self) {
		self.streams.lock().reset();
	}

	/// Last accepted sequence for a run's stream.
	pub fn last_seq(&self, run_id: Option<&str>, stream: &StreamKind) -> Option<u64> {
		self.streams.lock().last_seq(run_id, stream)
	}
}

/// Runs whose stream positions are remembered at once.
pub const MAX_TRACKED_RUNS: usize = 256;

/// Last accepted `seq` per (run, stream kind).
///
/// Runs are kept in order of last activity; past [`MAX_TRACKED_RUNS`] the
/// least recently active run is forgotten.
#[derive(Debug, Default)]
pub struct StreamTracker {
	runs: IndexMap<Option<String>, HashMap<StreamKind, u64>>,
}

impl StreamTracker {
	/// Records `event` and returns true if its `seq` advances the stream.
	pub fn accept(&mut self, event: &AgentEvent) -> bool {
		let mut streams = self.runs.shift_remove(&event.run_id).unwrap_or_default();
		let advanced = streams.get(&event.stream).is_none_or(|last| event.seq > *last);
		if advanced {
			streams.insert(event.stream.clone(), event.seq);
		}
		self.runs.insert(event.run_id.clone(), streams);
		while self.runs.len() > MAX_TRACKED_RUNS {
			self.runs.shift_remove_index(0);
		}
		advanced
	}

	pub fn last_seq(&self, run_id: Option<&str>, stream: &StreamKind) -> Option<u64> {
		self.runs
			.get(&run_id.map(str::to_string))
			.and_then(|streams| streams.get(stream))
			.copied()
	}

	/// Runs currently tracked.
	pub fn run_count(&self) -> usize {
		self.runs.len()
	}

	pub fn reset(&mut self) {
		self.runs.clear();
	}
}

/// RAII handle that unregisters an event handler on drop.
///
/// Holds a weak reference to the handler map, so dropping it after the
/// session is gone is a no-op.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
	id: HandlerId,
	handlers: Weak<Mutex<IndexMap<HandlerId, HandlerEntry>>>,
	detached: bool,
}

impl Subscription {
	fn from_handler_map(id: HandlerId, handlers: &HandlerMap) -> Self {
		Self {
			id,
			handlers: Arc::downgrade(handlers),
			detached: false,
		}
	}

	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Keeps the handler registered for the dispatcher's whole lifetime.
	pub fn detach(mut self) {
		self.detached = true;
	}

	/// Removes the handler now.
	pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if self.detached {
			return;
		}
		if let Some(map) = self.handlers.upgrade() {
			map.lock().shift_remove(&self.id);
		}
	}
}
