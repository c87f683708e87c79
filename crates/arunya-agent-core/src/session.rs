// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session identity and history types.
//!
//! A session is a bounded period of user activity identified by a single id
//! and ended by idle timeout. Ids of past sessions are retained in a bounded,
//! most-recent-first [`SessionHistory`] so the server can stitch a visitor's
//! activity back together across renewals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default capacity of the session history.
pub const DEFAULT_HISTORY_CAP: usize = 20;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
	/// Generates a fresh, cryptographically random id.
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	#[must_use]
	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for SessionId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// The current session held in tab-scoped state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
	pub id: SessionId,
	pub created_at: DateTime<Utc>,
	/// Timestamp of the last successful delivery activity. Updating this is
	/// the only mechanism that postpones idle expiry.
	pub last_used: DateTime<Utc>,
}

impl SessionRecord {
	/// Creates a new session starting at `now`.
	pub fn new(now: DateTime<Utc>) -> Self {
		Self {
			id: SessionId::new(),
			created_at: now,
			last_used: now,
		}
	}

	/// Returns true when `now - last_used` exceeds the idle timeout.
	pub fn is_expired(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
		now - self.last_used > timeout
	}
}

/// Bounded, duplicate-free collection of archived session ids, most recent
/// first.
///
/// Pushing an id that is already present moves it to the front rather than
/// duplicating it. When capacity is exceeded the oldest entries are evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistory {
	ids: Vec<SessionId>,
	cap: usize,
}

impl SessionHistory {
	/// Creates an empty history with the given capacity.
	pub fn new(cap: usize) -> Self {
		Self {
			ids: Vec::new(),
			cap,
		}
	}

	/// Archives an id at the front, deduplicating and evicting the oldest
	/// entries beyond capacity.
	pub fn push(&mut self, id: SessionId) {
		self.ids.retain(|existing| *existing != id);
		self.ids.insert(0, id);
		self.ids.truncate(self.cap);
	}

	/// Most-recent-first snapshot of the archived ids.
	///
	/// Returns an owned copy so later renewals cannot retroactively alter a
	/// payload composed from this snapshot.
	pub fn snapshot(&self) -> Vec<SessionId> {
		self.ids.clone()
	}

	pub fn len(&self) -> usize {
		self.ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}

	pub fn cap(&self) -> usize {
		self.cap
	}

	pub fn contains(&self, id: &SessionId) -> bool {
		self.ids.contains(id)
	}

	/// Most recently archived id, if any.
	pub fn most_recent(&self) -> Option<&SessionId> {
		self.ids.first()
	}
}

impl Default for SessionHistory {
	fn default() -> Self {
		Self::new(DEFAULT_HISTORY_CAP)
	}
}
