// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Embed configuration parsed from the host page's script tag.
//!
//! Attributes are read exactly once at load. The collection endpoint origin
//! is derived from the script's own `src` URL rather than configured
//! separately, so an embed can never be pointed at a third-party collector
//! by attribute tampering alone.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::error::CoreError;
use crate::session::DEFAULT_HISTORY_CAP;
use crate::website::WebsiteId;

/// Script-tag attribute carrying the required website identifier.
pub const WEBSITE_ID_ATTR: &str = "data-website-id";
/// Script-tag attribute overriding the session idle timeout, in ms.
pub const SESSION_TIMEOUT_ATTR: &str = "data-session-timeout";

/// Default session idle timeout (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(1_800_000);
/// Default interval between periodic expiry checks.
pub const DEFAULT_EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// Default fixed-window throttle interval per event type.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(500);
/// Default quiet period before a mutation-triggered rescan.
pub const DEFAULT_RESCAN_DEBOUNCE: Duration = Duration::from_millis(500);

/// Configuration of one mounted agent.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
	/// Identifier echoed on every payload.
	pub website_id: WebsiteId,
	/// Origin of the collection endpoint (scheme + host + port).
	pub origin: Url,
	/// Idle time after which the current session expires.
	pub session_timeout: Duration,
	/// Interval of the periodic expiry check.
	pub expiry_check_interval: Duration,
	/// Capacity of the durable session history.
	pub history_cap: usize,
	/// Fixed-window throttle interval per event type.
	pub throttle_window: Duration,
	/// Quiet period before a mutation-triggered rescan.
	pub rescan_debounce: Duration,
}

impl EmbedConfig {
	/// Creates a configuration with all tunables at their defaults.
	pub fn new(website_id: WebsiteId, origin: Url) -> Self {
		Self {
			website_id,
			origin,
			session_timeout: DEFAULT_SESSION_TIMEOUT,
			expiry_check_interval: DEFAULT_EXPIRY_CHECK_INTERVAL,
			history_cap: DEFAULT_HISTORY_CAP,
			throttle_window: DEFAULT_THROTTLE_WINDOW,
			rescan_debounce: DEFAULT_RESCAN_DEBOUNCE,
		}
	}

	/// Parses the configuration from script-tag attributes plus the script's
	/// own `src` URL.
	///
	/// A missing website id is fatal to initialization. A session-timeout
	/// attribute that is not a finite, non-negative integer count of
	/// milliseconds silently coerces to the default.
	pub fn from_embed_attributes(
		attrs: &HashMap<String, String>,
		script_src: &str,
	) -> Result<Self, CoreError> {
		let website_id = attrs
			.get(WEBSITE_ID_ATTR)
			.ok_or(CoreError::MissingWebsiteId)?
			.parse::<WebsiteId>()?;

		let origin = derive_origin(script_src)?;

		let mut config = Self::new(website_id, origin);
		config.session_timeout =
			coerce_session_timeout(attrs.get(SESSION_TIMEOUT_ATTR).map(String::as_str));
		Ok(config)
	}

	/// Overrides the session idle timeout.
	pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
		self.session_timeout = timeout;
		self
	}

	/// Overrides the periodic expiry check interval.
	pub fn with_expiry_check_interval(mut self, interval: Duration) -> Self {
		self.expiry_check_interval = interval;
		self
	}

	/// Overrides the session history capacity.
	pub fn with_history_cap(mut self, cap: usize) -> Self {
		self.history_cap = cap;
		self
	}

	/// Overrides the per-type throttle window.
	pub fn with_throttle_window(mut self, window: Duration) -> Self {
		self.throttle_window = window;
		self
	}

	/// Overrides the rescan debounce quiet period.
	pub fn with_rescan_debounce(mut self, debounce: Duration) -> Self {
		self.rescan_debounce = debounce;
		self
	}

	/// The collection endpoint the delivery pipeline posts to.
	pub fn track_endpoint(&self) -> Url {
		self.origin
			.join("/api/track")
			.expect("origin URL accepts a fixed path")
	}
}

/// Coerces a session-timeout attribute value to a duration.
///
/// Any value that does not parse as a non-negative integer count of
/// milliseconds falls back to [`DEFAULT_SESSION_TIMEOUT`].
pub fn coerce_session_timeout(raw: Option<&str>) -> Duration {
	match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
		Some(ms) if ms >= 0 => Duration::from_millis(ms as u64),
		_ => DEFAULT_SESSION_TIMEOUT,
	}
}

/// Derives the collection origin from the script's `src` URL by stripping
/// path, query, and fragment.
fn derive_origin(script_src: &str) -> Result<Url, CoreError> {
	let mut url = Url::parse(script_src)
		.map_err(|_| CoreError::InvalidScriptSrc(script_src.to_string()))?;
	if !url.has_host() {
		return Err(CoreError::InvalidScriptSrc(script_src.to_string()));
	}
	url.set_path("");
	url.set_query(None);
	url.set_fragment(None);
	Ok(url)
}
