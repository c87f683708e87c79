// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery pipeline.
//!
//! Sends are fire-and-forget from the caller's side. Internally each payload
//! walks a ladder: a beacon-style transport first (non-blocking, unload-safe,
//! allowed to refuse), then a JSON POST to the collection endpoint, retried
//! with exponential backoff before the failure is logged and dropped. Every
//! terminal outcome touches the session manager, so delivery activity itself
//! extends the session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};
use url::Url;

use arunya_agent_core::EventPayload;
use arunya_common_http::{retry, RetryConfig};

use crate::clock::Clock;
use crate::error::{AgentError, Result};
use crate::session::SessionManager;

const LIB_HEADER: &str = "x-arunya-lib";
const LIB_VERSION_HEADER: &str = "x-arunya-lib-version";
const LIB_NAME: &str = "arunya-agent";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Beacon-style transmission primitive: non-blocking, best-effort, designed
/// to survive page unload.
///
/// Returns `false` when the transport is unsupported or refuses the payload
/// (typically a size cap); the pipeline then falls back to a standard
/// request.
pub trait BeaconTransport: Send + Sync {
	fn send(&self, endpoint: &Url, body: &[u8]) -> bool;
}

/// Transport for hosts without a beacon primitive; refuses everything so
/// the pipeline always uses the HTTP fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBeacon;

impl BeaconTransport for NoBeacon {
	fn send(&self, _endpoint: &Url, _body: &[u8]) -> bool {
		false
	}
}

/// Fixed-window throttle keyed by event type.
///
/// One call per key per window, measured from the last accepted call; a
/// burst exactly at the boundary is permitted once. Not a token bucket.
pub(crate) struct TypeThrottle {
	window: chrono::Duration,
	clock: Arc<dyn Clock>,
	last_accepted: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TypeThrottle {
	pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
		let window = chrono::Duration::from_std(window)
			.unwrap_or_else(|_| chrono::Duration::milliseconds(i64::MAX));
		Self {
			window,
			clock,
			last_accepted: Mutex::new(HashMap::new()),
		}
	}

	/// Accepts or rejects a call for `key`, recording the acceptance time.
	pub fn admits(&self, key: &str) -> bool {
		let now = self.clock.now();
		let mut last = self.last_accepted.lock().expect("throttle poisoned");
		match last.get(key) {
			Some(accepted) if now - *accepted < self.window => false,
			_ => {
				last.insert(key.to_string(), now);
				true
			}
		}
	}
}

/// Sends composed payloads to the collection endpoint.
pub struct DeliveryPipeline {
	client: reqwest::Client,
	endpoint: Url,
	beacon: Arc<dyn BeaconTransport>,
	throttle: TypeThrottle,
	sessions: Arc<SessionManager>,
	retry_config: RetryConfig,
}

impl DeliveryPipeline {
	pub(crate) fn new(
		endpoint: Url,
		beacon: Arc<dyn BeaconTransport>,
		sessions: Arc<SessionManager>,
		clock: Arc<dyn Clock>,
		throttle_window: Duration,
	) -> Self {
		Self {
			client: arunya_common_http::new_client_with_timeout(HTTP_TIMEOUT),
			endpoint,
			beacon,
			throttle: TypeThrottle::new(throttle_window, clock),
			sessions,
			retry_config: RetryConfig::default(),
		}
	}

	/// Throttle check for one event type. Consulted before composition so a
	/// rejected call wastes no work.
	pub(crate) fn admits(&self, event_type: &str) -> bool {
		self.throttle.admits(event_type)
	}

	/// Fire-and-forget send. The payload is immutable from here on; failures
	/// never reach the caller.
	pub(crate) fn send(self: &Arc<Self>, payload: EventPayload) {
		let event_type = payload.kind.throttle_key().to_string();
		let body = match serde_json::to_vec(&payload) {
			Ok(body) => body,
			Err(e) => {
				error!(error = %e, "failed to serialize payload");
				return;
			}
		};
		let pipeline = Arc::clone(self);
		tokio::spawn(async move {
			pipeline.transmit(&event_type, body).await;
		});
	}

	async fn transmit(&self, event_type: &str, body: Vec<u8>) {
		if self.beacon.send(&self.endpoint, &body) {
			debug!(event_type, "payload handed to beacon transport");
		} else {
			match retry(&self.retry_config, || self.post(&body)).await {
				Ok(()) => debug!(event_type, "payload delivered"),
				Err(e) => {
					warn!(event_type, error = %e, "delivery failed, dropping payload")
				}
			}
		}
		self.sessions.touch();
	}

	async fn post(&self, body: &[u8]) -> Result<()> {
		let response = self
			.client
			.post(self.endpoint.clone())
			.header(reqwest::header::CONTENT_TYPE, "application/json")
			.header(LIB_HEADER, LIB_NAME)
			.header(LIB_VERSION_HEADER, env!("CARGO_PKG_VERSION"))
			.body(body.to_vec())
			.send()
			.await?;

		let status = response.status();
		if status.is_success() {
			Ok(())
		} else {
			// Any non-success response is treated like a network failure for
			// retry purposes.
			Err(AgentError::ServerError {
				status: status.as_u16(),
			})
		}
	}
}
