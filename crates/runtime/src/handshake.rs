//! Pre-ready negotiation.
//!
//! Tracks the single outstanding [`ChallengeState`], builds the `connect`
//! parameters, and validates the acknowledgment. The negotiator does no I/O;
//! the supervisor sends what it builds and feeds back what arrives.

use std::sync::Arc;

use gw_protocol::{Challenge, ConnectParams, HelloOk, HelloPayload};
use serde_json::Value;
use tokio::time::Instant;

use crate::config::{Credentials, SessionConfig};
use crate::error::{Error, HandshakeError, Result};

/// Challenge received and not yet answered by a hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeState {
	pub nonce: String,
	pub issued_at: Instant,
}

/// How a challenge relates to the one already pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
	/// No challenge was pending; send `connect`.
	Fresh,
	/// A different nonce replaced the pending one; abort the in-flight
	/// `connect` and send a new one.
	Restart,
	/// Same nonce again; ignore.
	Duplicate,
}

pub struct HandshakeNegotiator {
	config: Arc<SessionConfig>,
	credentials: Credentials,
	challenge: Option<ChallengeState>,
}

impl HandshakeNegotiator {
	pub fn new(config: Arc<SessionConfig>, credentials: Credentials) -> Self {
		Self {
			config,
			credentials,
			challenge: None,
		}
	}

	/// Records a `connect.challenge` payload.
	pub fn on_challenge(&mut self, payload: &Value) -> std::result::Result<ChallengeOutcome, HandshakeError> {
		let challenge: Challenge =
			serde_json::from_value(payload.clone()).map_err(|e| HandshakeError::MalformedChallenge(e.to_string()))?;
		if challenge.nonce.trim().is_empty() {
			return Err(HandshakeError::MalformedChallenge("empty nonce".to_string()));
		}

		let outcome = match &self.challenge {
			None => ChallengeOutcome::Fresh,
			Some(pending) if pending.nonce == challenge.nonce => return Ok(ChallengeOutcome::Duplicate),
			Some(_) => ChallengeOutcome::Restart,
		};
		self.challenge = Some(ChallengeState {
			nonce: challenge.nonce,
			issued_at: Instant::now(),
		});
		Ok(outcome)
	}

	/// Parameters for the `connect` request.
	pub fn connect_params(&self) -> ConnectParams {
		ConnectParams {
			min_protocol: self.config.min_protocol,
			max_protocol: self.config.max_protocol,
			client: (&self.config.client).into(),
			caps: self.config.caps.clone(),
			commands: self.config.commands.clone(),
			permissions: self.config.permissions.clone(),
			auth: self.credentials.to_auth(),
			role: self.config.role.clone(),
			scopes: self.config.scopes.clone(),
		}
	}

	/// Consumes the `connect` outcome and discards the challenge.
	///
	/// Rejections and unrecognized payloads become [`Error::Handshake`];
	/// transport-level failures pass through unchanged so the caller can
	/// retry them.
	pub fn complete(&mut self, result: Result<Value>) -> Result<HelloOk> {
		self.challenge = None;
		let payload = match result {
			Ok(payload) => payload,
			Err(Error::Remote { code, message, .. }) => return Err(HandshakeError::Rejected { code, message }.into()),
			Err(other) => return Err(other),
		};

		let tag = payload.get("type").and_then(Value::as_str).unwrap_or("<missing>").to_string();
		let hello = match serde_json::from_value::<HelloPayload>(payload) {
			Ok(HelloPayload::HelloOk(hello)) => hello,
			Ok(HelloPayload::Unknown) => return Err(HandshakeError::UnexpectedPayload(format!("type '{tag}'")).into()),
			Err(e) => return Err(HandshakeError::UnexpectedPayload(format!("type '{tag}': {e}")).into()),
		};

		let (min, max) = (self.config.min_protocol, self.config.max_protocol);
		if !(min..=max).contains(&hello.protocol) {
			return Err(HandshakeError::ProtocolMismatch {
				negotiated: hello.protocol,
				min,
				max,
			}
			.into());
		}
		Ok(hello)
	}

	/// Drops any pending challenge.
	pub fn reset(&mut self) {
		self.challenge = None;
	}

	pub fn challenge(&self) -> Option<&ChallengeState> {
		self.challenge.as_ref()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn negotiator() -> HandshakeNegotiator {
		HandshakeNegotiator::new(Arc::new(SessionConfig::default()), Credentials::token("secret"))
	}

	#[test]
	fn challenge_outcomes() {
		let mut n = negotiator();
		assert_eq!(n.on_challenge(&json!({"nonce": "abc"})), Ok(ChallengeOutcome::Fresh));
		assert_eq!(n.on_challenge(&json!({"nonce": "abc", "ts": 5})), Ok(ChallengeOutcome::Duplicate));
		assert_eq!(n.on_challenge(&json!({"nonce": "def"})), Ok(ChallengeOutcome::Restart));
		assert_eq!(n.challenge().map(|c| c.nonce.as_str()), Some("def"));
	}

	#[test]
	fn malformed_challenges_are_rejected() {
		let mut n = negotiator();
		assert!(matches!(n.on_challenge(&json!({})), Err(HandshakeError::MalformedChallenge(_))));
		assert!(matches!(n.on_challenge(&json!({"nonce": "  "})), Err(HandshakeError::MalformedChallenge(_))));
		assert!(n.challenge().is_none());
	}

	#[test]
	fn connect_params_carry_identity_and_credentials() {
		let n = negotiator();
		let params = n.connect_params();
		assert_eq!(params.min_protocol, 3);
		assert_eq!(params.max_protocol, 3);
		assert_eq!(params.role, "operator");
		assert_eq!(params.auth.and_then(|a| a.token).as_deref(), Some("secret"));
		assert_eq!(params.client.id, "gw-rs");
	}

	#[test]
	fn hello_ok_completes() {
		let mut n = negotiator();
		n.on_challenge(&json!({"nonce": "abc"})).unwrap();
		let hello = n
			.complete(Ok(json!({"type": "hello-ok", "protocol": 3, "policy": {"tickIntervalMs": 5000}})))
			.unwrap();
		assert_eq!(hello.protocol, 3);
		assert_eq!(hello.policy.tick_interval_ms, Some(5000));
		assert!(n.challenge().is_none());
	}

	#[test]
	fn rejection_is_a_handshake_error() {
		let mut n = negotiator();
		let result = n.complete(Err(Error::Remote {
			code: "UNAUTHORIZED".into(),
			message: "bad token".into(),
			retryable: false,
			details: None,
		}));
		assert!(matches!(
			result,
			Err(Error::Handshake(HandshakeError::Rejected { ref code, .. })) if code == "UNAUTHORIZED"
		));
	}

	#[test]
	fn unexpected_payload_tag_is_fatal() {
		let mut n = negotiator();
		let result = n.complete(Ok(json!({"type": "welcome", "protocol": 3})));
		assert!(matches!(result, Err(Error::Handshake(HandshakeError::UnexpectedPayload(_)))));

		let result = n.complete(Ok(json!({"protocol": 3})));
		assert!(matches!(result, Err(Error::Handshake(HandshakeError::UnexpectedPayload(_)))));
	}

	#[test]
	fn protocol_outside_range_is_fatal() {
		let mut n = negotiator();
		let result = n.complete(Ok(json!({"type": "hello-ok", "protocol": 2})));
		assert!(matches!(
			result,
			Err(Error::Handshake(HandshakeError::ProtocolMismatch { negotiated: 2, min: 3, max: 3 }))
		));
	}

	#[test]
	fn transport_failures_pass_through() {
		let mut n = negotiator();
		assert!(matches!(n.complete(Err(Error::ConnectionReset)), Err(Error::ConnectionReset)));
	}
}
