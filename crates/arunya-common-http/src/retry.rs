// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry with exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Classifies an error as worth retrying or not.
///
/// Transient failures (timeouts, connection resets, throttling, 5xx
/// responses) are retryable; validation and client errors are not.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if let Some(status) = self.status() {
			return matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504);
		}
		self.is_timeout() || self.is_connect()
	}
}

/// Configuration for [`retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Total number of attempts, including the first.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	pub base_delay: Duration,
	/// Multiplier applied to the delay after each failed attempt.
	pub factor: u32,
	/// Upper bound on any single delay.
	pub max_delay: Duration,
	/// Whether to jitter delays to avoid thundering herds.
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(500),
			factor: 2,
			max_delay: Duration::from_secs(30),
			jitter: true,
		}
	}
}

impl RetryConfig {
	/// The delay to sleep after the given failed attempt (1-based).
	pub fn delay_for(&self, failed_attempt: u32) -> Duration {
		let exponent = failed_attempt.saturating_sub(1);
		let multiplier = self.factor.saturating_pow(exponent);
		let delay = self
			.base_delay
			.saturating_mul(multiplier)
			.min(self.max_delay);
		if self.jitter {
			// 75%..125% of the nominal delay.
			delay.mul_f64(0.75 + fastrand::f64() * 0.5).min(self.max_delay)
		} else {
			delay
		}
	}
}

/// Runs `op` until it succeeds, the error is not retryable, or the attempt
/// budget is exhausted. Returns the last error on giving up.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
	E: RetryableError + std::fmt::Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	let mut attempt: u32 = 0;
	loop {
		match op().await {
			Ok(value) => return Ok(value),
			Err(e) => {
				attempt += 1;
				if attempt >= config.max_attempts || !e.is_retryable() {
					return Err(e);
				}
				let delay = config.delay_for(attempt);
				debug!(
					attempt,
					delay_ms = delay.as_millis() as u64,
					error = %e,
					"retrying after transient failure"
				);
				tokio::time::sleep(delay).await;
			}
		}
	}
}
