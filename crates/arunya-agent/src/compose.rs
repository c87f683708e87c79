// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event payload composition.
//!
//! Pure: a function of the captured page snapshot plus session output. No
//! network, no storage, no side effects, which keeps it independently
//! testable. The history snapshot is an owned copy, so later renewals never
//! retroactively alter an already-queued payload.

use chrono::{DateTime, Utc};

use arunya_agent_core::{EventKind, EventPayload, PageUrl, ScreenSize, SessionId, WebsiteId};

use crate::dom::PageSnapshot;

/// Composes a full payload from the context common to every event.
pub fn compose_event(
	kind: EventKind,
	snapshot: &PageSnapshot,
	session_id: SessionId,
	previous_sessions: Vec<SessionId>,
	website_id: WebsiteId,
	now: DateTime<Utc>,
) -> EventPayload {
	EventPayload {
		kind,
		timestamp: now.timestamp_millis(),
		url: PageUrl {
			hostname: snapshot.hostname.clone(),
			path: snapshot.path.clone(),
			query: snapshot.query.clone(),
		},
		referrer: snapshot.referrer.clone(),
		screen: ScreenSize {
			width: snapshot.screen_width,
			height: snapshot.screen_height,
		},
		timezone: snapshot.timezone.clone(),
		session_id,
		website_id,
		previous_sessions,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn snapshot() -> PageSnapshot {
		PageSnapshot {
			hostname: "example.com".to_string(),
			path: "/pricing".to_string(),
			query: "ref=nav".to_string(),
			referrer: String::new(),
			screen_width: 1280,
			screen_height: 800,
			timezone: "Europe/Berlin".to_string(),
			title: "Pricing".to_string(),
		}
	}

	#[test]
	fn test_compose_copies_context() {
		let session_id = SessionId::new();
		let now = Utc::now();
		let payload = compose_event(
			EventKind::Generic,
			&snapshot(),
			session_id,
			Vec::new(),
			WebsiteId::new("abc123").unwrap(),
			now,
		);

		assert_eq!(payload.timestamp, now.timestamp_millis());
		assert_eq!(payload.url.hostname, "example.com");
		assert_eq!(payload.url.path, "/pricing");
		assert_eq!(payload.url.query, "ref=nav");
		assert_eq!(payload.referrer, "");
		assert_eq!(payload.screen.width, 1280);
		assert_eq!(payload.timezone, "Europe/Berlin");
		assert_eq!(payload.session_id, session_id);
	}

	#[test]
	fn test_history_snapshot_is_owned() {
		let previous = vec![SessionId::new(), SessionId::new()];
		let payload = compose_event(
			EventKind::Generic,
			&snapshot(),
			SessionId::new(),
			previous.clone(),
			WebsiteId::new("abc123").unwrap(),
			Utc::now(),
		);

		assert_eq!(payload.previous_sessions, previous);
	}

	#[test]
	fn test_kind_is_preserved() {
		let payload = compose_event(
			EventKind::Click {
				target: "button-0".to_string(),
			},
			&snapshot(),
			SessionId::new(),
			Vec::new(),
			WebsiteId::new("abc123").unwrap(),
			Utc::now(),
		);

		assert!(matches!(payload.kind, EventKind::Click { .. }));
	}
}
