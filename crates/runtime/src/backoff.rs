//! Reconnect delay schedule.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Exponential backoff with jitter, capped at `max_ms`.
#[derive(Debug, Clone)]
pub struct Backoff {
	config: BackoffConfig,
	attempt: u32,
}

impl Backoff {
	pub fn new(config: BackoffConfig) -> Self {
		Self { config, attempt: 0 }
	}

	/// Delay before retry number `attempt` (zero-based), without jitter.
	pub fn base_delay(&self, attempt: u32) -> Duration {
		let exp = self.config.factor.powi(attempt.min(i32::MAX as u32) as i32);
		let ms = (self.config.initial_ms as f64 * exp).min(self.config.max_ms as f64);
		Duration::from_millis(ms as u64)
	}

	/// Returns the next delay and advances the schedule.
	pub fn next_delay(&mut self) -> Duration {
		let base = self.base_delay(self.attempt).as_millis() as f64;
		self.attempt = self.attempt.saturating_add(1);

		let jitter = self.config.jitter;
		let spread = if jitter > 0.0 {
			rand::rng().random_range(-jitter..=jitter)
		} else {
			0.0
		};
		let ms = (base * (1.0 + spread)).clamp(0.0, self.config.max_ms as f64);
		Duration::from_millis(ms as u64)
	}

	/// Retries scheduled since the last reset.
	pub fn attempt(&self) -> u32 {
		self.attempt
	}

	pub fn reset(&mut self) {
		self.attempt = 0;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn no_jitter() -> BackoffConfig {
		BackoffConfig {
			jitter: 0.0,
			..BackoffConfig::default()
		}
	}

	#[test]
	fn doubles_up_to_cap() {
		let mut backoff = Backoff::new(no_jitter());
		let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_millis() as u64).collect();
		assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000]);
		assert_eq!(backoff.attempt(), 8);
	}

	#[test]
	fn delays_never_decrease_without_jitter() {
		let mut backoff = Backoff::new(BackoffConfig {
			initial_ms: 300,
			max_ms: 10_000,
			factor: 1.7,
			jitter: 0.0,
		});
		let mut previous = Duration::ZERO;
		for _ in 0..40 {
			let delay = backoff.next_delay();
			assert!(delay >= previous);
			assert!(delay <= Duration::from_millis(10_000));
			previous = delay;
		}
	}

	#[test]
	fn reset_returns_to_initial_delay() {
		let mut backoff = Backoff::new(no_jitter());
		backoff.next_delay();
		backoff.next_delay();
		backoff.next_delay();
		backoff.reset();
		assert_eq!(backoff.attempt(), 0);
		assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
	}

	#[test]
	fn jitter_stays_within_bounds_and_cap() {
		let config = BackoffConfig::default();
		for attempt in 0..10 {
			let mut backoff = Backoff::new(config.clone());
			for _ in 0..attempt {
				backoff.next_delay();
			}
			let base = backoff.base_delay(attempt).as_millis() as f64;
			let delay = backoff.next_delay().as_millis() as f64;
			assert!(delay >= (base * 0.8).floor(), "attempt {attempt}: {delay} < {base} - 20%");
			assert!(delay <= (base * 1.2).ceil().min(30_000.0), "attempt {attempt}: {delay} too large");
		}
	}

	#[test]
	fn huge_attempt_counts_saturate() {
		let backoff = Backoff::new(no_jitter());
		assert_eq!(backoff.base_delay(u32::MAX), Duration::from_millis(30_000));
	}
}
