//! Request/response correlation.
//!
//! Every outgoing command gets a fresh id and a [`PendingCall`]. The matching
//! `res` frame resolves it. An entry leaves the pending map exactly once, and
//! whoever removes it owns the resolution:
//!
//! - [`RequestRegistry::resolve`]: the response arrived
//! - [`PendingCall::wait`] deadline: the caller gets [`Error::RequestTimeout`]
//! - [`RequestRegistry::flush`]: the connection went away
//! - dropping the [`PendingCall`]: the caller abandoned the request
//!
//! A response for an id that is no longer pending is dropped.


use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashMap;
use gw_protocol::ResponseFrame;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

struct PendingRequest {
	method: String,
	sent_at: Instant,
	tx: oneshot::Sender<Result<Value>>,
}

type PendingMap = Arc<DashMap<String, PendingRequest>>;

/// Pending requests keyed by id.
pub struct RequestRegistry {
	last_id: AtomicU64,
	pending: PendingMap,
}

impl Default for RequestRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl RequestRegistry {
	pub fn new() -> Self {
		Self {
			last_id: AtomicU64::new(0),
			pending: Arc::new(DashMap::new()),
		}
	}

	/// Returns an id never handed out before by this registry.
	///
	/// Ids keep increasing across reconnects, so a straggling response from
	/// an old connection can never match a newer request.
	pub fn next_id(&self) -> String {
		(self.last_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
	}

	/// Registers a pending request for `method` and returns its handle.
	pub fn register(&self, method: &str) -> PendingCall {
		let id = self.next_id();
		let (tx, rx) = oneshot::channel();
		self.pending.insert(
			id.clone(),
			PendingRequest {
				method: method.to_string(),
				sent_at: Instant::now(),
				tx,
			},
		);

		PendingCall {
			rx,
			guard: CancelGuard {
				id,
				method: method.to_string(),
				pending: Arc::clone(&self.pending),
				completed: false,
			},
		}
	}

	/// Resolves the request matching `response.id`.
	///
	/// Returns `false` if no such request is pending (late, duplicate, or
	/// never sent by this client).
	pub fn resolve(&self, response: ResponseFrame) -> bool {
		let Some((id, pending)) = self.pending.remove(&response.id) else {
			debug!(id = %response.id, "Dropping response for unknown or expired request");
			return false;
		};

		debug!(
			id = %id,
			method = %pending.method,
			ok = response.ok,
			elapsed_ms = pending.sent_at.elapsed().as_millis() as u64,
			"Response received"
		);

		let _ = pending.tx.send(response_result(response));
		true
	}

	/// Rejects every pending request with the error built by `reason`.
	///
	/// Returns how many requests were rejected.
	pub fn flush(&self, reason: impl Fn() -> Error) -> usize {
		let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
		let mut flushed = 0;
		for id in ids {
			if let Some((_, pending)) = self.pending.remove(&id) {
				debug!(id = %id, method = %pending.method, "Rejecting pending request");
				let _ = pending.tx.send(Err(reason()));
				flushed += 1;
			}
		}
		flushed
	}

	/// Removes a request without resolving it. Its caller observes
	/// [`Error::SessionClosed`] if still waiting.
	pub fn cancel(&self, id: &str) -> bool {
		self.pending.remove(id).is_some()
	}

	pub fn contains(&self, id: &str) -> bool {
		self.pending.contains_key(id)
	}

	pub fn len(&self) -> usize {
		self.pending.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}
}

/// Converts a response frame into the caller-facing result.
fn response_result(response: ResponseFrame) -> Result<Value> {
	if response.ok {
		return Ok(response.payload.unwrap_or(Value::Null));
	}
	Err(match response.error {
		Some(error) => Error::Remote {
			code: error.code,
			message: error.message,
			retryable: error.retryable,
			details: error.details,
		},
		None => Error::Remote {
			code: "UNKNOWN".to_string(),
			message: "request failed without error details".to_string(),
			retryable: false,
			details: None,
		},
	})
}

/// RAII guard removing the pending entry when a call is abandoned.
struct CancelGuard {
	id: String,
	method: String,
	pending: PendingMap,
	completed: bool,
}

impl CancelGuard {
	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.pending.remove(&self.id).is_some() {
			debug!(id = %self.id, method = %self.method, "Request abandoned by caller");
		}
	}
}

/// Handle to one pending request.
///
/// Await it directly for an unbounded wait, or use [`wait`](Self::wait) for a
/// deadline. Dropping it cancels the request locally; nothing is sent to the
/// server.
pub struct PendingCall {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl PendingCall {
	/// Request id to put on the wire.
	pub fn id(&self) -> &str {
		&self.guard.id
	}

	pub fn method(&self) -> &str {
		&self.guard.method
	}

	/// Waits for the response, failing with [`Error::RequestTimeout`] after
	/// `timeout`.
	pub async fn wait(mut self, timeout: Duration) -> Result<Value> {
		match tokio::time::timeout(timeout, &mut self).await {
			Ok(result) => result,
			Err(_) => {
				self.guard.complete();
				if self.guard.pending.remove(&self.guard.id).is_some() {
					debug!(id = %self.guard.id, method = %self.guard.method, "Request timed out");
					return Err(Error::RequestTimeout {
						method: self.guard.method.clone(),
						timeout_ms: timeout.as_millis() as u64,
					});
				}
				// Resolved between the deadline firing and the removal above.
				match self.rx.try_recv() {
					Ok(result) => result,
					Err(_) => Err(Error::RequestTimeout {
						method: self.guard.method.clone(),
						timeout_ms: timeout.as_millis() as u64,
					}),
				}
			}
		}
	}
}

impl Future for PendingCall {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::SessionClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}
