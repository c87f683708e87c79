// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event payload types.
//!
//! One JSON object is sent per event. The `type` discriminant is carried
//! inline (internally tagged), with the context fields common to every kind
//! flattened alongside it. Payloads are immutable once composed; the
//! delivery pipeline receives them by value and never mutates them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::session::SessionId;
use crate::website::WebsiteId;

const MAX_EVENT_NAME_LENGTH: usize = 200;

/// Host, path, and query of the page an event was observed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUrl {
	pub hostname: String,
	pub path: String,
	pub query: String,
}

impl PageUrl {
	/// Normalized path plus query, the identity used for navigation
	/// deduplication. The query is appended only when non-empty.
	pub fn location(&self) -> String {
		if self.query.is_empty() {
			self.path.clone()
		} else {
			format!("{}?{}", self.path, self.query)
		}
	}
}

/// Screen dimensions of the host viewport, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
	pub width: u32,
	pub height: u32,
}

/// Variant-specific portion of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
	/// A page was viewed, either on load or via SPA navigation.
	PageView { title: String },
	/// A tracked element was clicked.
	Click { target: String },
	/// A host-defined event, named and carrying an open data bag.
	CustomEvent {
		name: String,
		#[serde(default)]
		data: Map<String, Value>,
	},
	/// Context-only payload with no variant fields.
	Generic,
}

impl EventKind {
	/// The key used by the delivery pipeline's fixed-window throttle.
	///
	/// Built-in kinds throttle on their discriminant; custom events throttle
	/// on their name so unrelated events do not starve each other.
	pub fn throttle_key(&self) -> &str {
		match self {
			EventKind::PageView { .. } => "page_view",
			EventKind::Click { .. } => "click",
			EventKind::CustomEvent { name, .. } => name,
			EventKind::Generic => "generic",
		}
	}
}

/// A single event record, exactly as serialized to the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
	#[serde(flatten)]
	pub kind: EventKind,
	/// Epoch milliseconds at composition time.
	pub timestamp: i64,
	pub url: PageUrl,
	/// Referrer of the page; an empty string is permitted.
	pub referrer: String,
	pub screen: ScreenSize,
	/// IANA timezone name, e.g. `Europe/Berlin`.
	pub timezone: String,
	pub session_id: SessionId,
	pub website_id: WebsiteId,
	/// Snapshot of the session history at composition time, most recent
	/// first.
	pub previous_sessions: Vec<SessionId>,
}

/// Validates a custom event name against the collection endpoint's rules.
///
/// Names are non-empty, at most 200 characters, and limited to alphanumerics
/// plus `_`, `$` and `.`. Invalid names are rejected before composition so
/// no work is wasted on a payload the server would refuse.
pub fn validate_event_name(name: &str) -> Result<(), CoreError> {
	if name.is_empty() || name.len() > MAX_EVENT_NAME_LENGTH {
		return Err(CoreError::InvalidEventName(name.to_string()));
	}
	let valid = name
		.chars()
		.all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
	if !valid {
		return Err(CoreError::InvalidEventName(name.to_string()));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn sample_payload(kind: EventKind) -> EventPayload {
		EventPayload {
			kind,
			timestamp: 1_700_000_000_000,
			url: PageUrl {
				hostname: "example.com".to_string(),
				path: "/pricing".to_string(),
				query: "ref=nav".to_string(),
			},
			referrer: "https://search.example".to_string(),
			screen: ScreenSize {
				width: 1920,
				height: 1080,
			},
			timezone: "Europe/Berlin".to_string(),
			session_id: SessionId::new(),
			website_id: WebsiteId::new("abc123").unwrap(),
			previous_sessions: vec![SessionId::new()],
		}
	}

	#[test]
	fn test_page_view_wire_shape() {
		let payload = sample_payload(EventKind::PageView {
			title: "Pricing".to_string(),
		});
		let json = serde_json::to_value(&payload).unwrap();

		assert_eq!(json["type"], "page_view");
		assert_eq!(json["title"], "Pricing");
		assert_eq!(json["url"]["hostname"], "example.com");
		assert_eq!(json["websiteId"], "abc123");
		assert_eq!(json["screen"]["width"], 1920);
		assert!(json["previousSessions"].is_array());
	}

	#[test]
	fn test_click_wire_shape() {
		let payload = sample_payload(EventKind::Click {
			target: "button-0".to_string(),
		});
		let json = serde_json::to_value(&payload).unwrap();

		assert_eq!(json["type"], "click");
		assert_eq!(json["target"], "button-0");
	}

	#[test]
	fn test_custom_event_wire_shape() {
		let mut data = Map::new();
		data.insert("plan".to_string(), serde_json::json!({"tier": "pro"}));
		let payload = sample_payload(EventKind::CustomEvent {
			name: "signup".to_string(),
			data,
		});
		let json = serde_json::to_value(&payload).unwrap();

		assert_eq!(json["type"], "custom_event");
		assert_eq!(json["name"], "signup");
		assert_eq!(json["data"]["plan"]["tier"], "pro");
	}

	#[test]
	fn test_generic_has_only_discriminant() {
		let payload = sample_payload(EventKind::Generic);
		let json = serde_json::to_value(&payload).unwrap();

		assert_eq!(json["type"], "generic");
		assert!(json.get("title").is_none());
		assert!(json.get("target").is_none());
	}

	#[test]
	fn test_location_normalization() {
		let url = PageUrl {
			hostname: "example.com".to_string(),
			path: "/a".to_string(),
			query: String::new(),
		};
		assert_eq!(url.location(), "/a");

		let url = PageUrl {
			query: "x=1".to_string(),
			..url
		};
		assert_eq!(url.location(), "/a?x=1");
	}

	#[test]
	fn test_throttle_keys() {
		assert_eq!(
			EventKind::PageView {
				title: String::new()
			}
			.throttle_key(),
			"page_view"
		);
		assert_eq!(
			EventKind::Click {
				target: String::new()
			}
			.throttle_key(),
			"click"
		);
		assert_eq!(
			EventKind::CustomEvent {
				name: "signup".to_string(),
				data: Map::new(),
			}
			.throttle_key(),
			"signup"
		);
	}

	#[test]
	fn test_event_name_validation() {
		assert!(validate_event_name("signup").is_ok());
		assert!(validate_event_name("checkout.completed").is_ok());
		assert!(validate_event_name("$pageleave").is_ok());

		assert!(validate_event_name("").is_err());
		assert!(validate_event_name("has space").is_err());
		assert!(validate_event_name(&"x".repeat(201)).is_err());
	}

	proptest! {
		#[test]
		fn payload_serde_roundtrip(
			title in "[a-zA-Z0-9 ]{0,40}",
			width in 1..5000u32,
			height in 1..5000u32,
		) {
			let mut payload = sample_payload(EventKind::PageView { title });
			payload.screen = ScreenSize { width, height };

			let json = serde_json::to_string(&payload).unwrap();
			let parsed: EventPayload = serde_json::from_str(&json).unwrap();
			prop_assert_eq!(payload, parsed);
		}

		#[test]
		fn valid_names_accepted(name in "[a-zA-Z0-9_$.]{1,200}") {
			prop_assert!(validate_event_name(&name).is_ok());
		}
	}
}
