// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session lifecycle management.
//!
//! The manager owns the whole lifecycle: Absent → Active → Expired →
//! (renewal) Active. The current session lives in agent-instance memory —
//! the tab-scoped side of the storage split — while the history of prior
//! session ids is durable and survives restarts. Every read or write of the
//! history goes through this type; nothing else touches those stores.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use arunya_agent_core::{SessionHistory, SessionId, SessionRecord};

use crate::clock::Clock;
use crate::error::Result;
use crate::store::{RecordStore, SESSION_HISTORY_STORE};

/// Callback invoked with (old, new) ids when a session is renewed.
///
/// Renewal emits no synthetic event by itself; policies that want an
/// identify-style event on renewal hook in here.
pub type RenewalHook = Arc<dyn Fn(SessionId, SessionId) + Send + Sync>;

struct SessionState {
	current: Option<SessionRecord>,
	history: SessionHistory,
	/// Archive records accepted in memory but not yet persisted; flushed by
	/// the next `check_expiry` pass.
	pending_archives: Vec<Value>,
}

/// Owner of session identity and history.
pub struct SessionManager {
	store: Arc<dyn RecordStore>,
	clock: Arc<dyn Clock>,
	timeout: chrono::Duration,
	history_cap: usize,
	state: Mutex<SessionState>,
	renewal_hook: Option<RenewalHook>,
}

impl SessionManager {
	pub fn new(
		store: Arc<dyn RecordStore>,
		clock: Arc<dyn Clock>,
		idle_timeout: Duration,
		history_cap: usize,
	) -> Self {
		let timeout = chrono::Duration::from_std(idle_timeout)
			.unwrap_or_else(|_| chrono::Duration::milliseconds(i64::MAX));
		Self {
			store,
			clock,
			timeout,
			history_cap,
			state: Mutex::new(SessionState {
				current: None,
				history: SessionHistory::new(history_cap),
				pending_archives: Vec::new(),
			}),
			renewal_hook: None,
		}
	}

	/// Installs the renewal hook.
	pub fn with_renewal_hook(mut self, hook: RenewalHook) -> Self {
		self.renewal_hook = Some(hook);
		self
	}

	/// Loads the durable session history into memory. Called once at mount.
	pub async fn load(&self) -> Result<()> {
		let records = self.store.get(SESSION_HISTORY_STORE).await?;
		let mut state = self.state.lock().expect("session state poisoned");
		for record in &records {
			let id = record
				.get("id")
				.and_then(Value::as_str)
				.and_then(|raw| raw.parse::<SessionId>().ok());
			match id {
				Some(id) => state.history.push(id),
				None => warn!("skipping malformed session history record"),
			}
		}
		debug!(entries = state.history.len(), "session history loaded");
		Ok(())
	}

	/// The current session id, creating or renewing as needed.
	///
	/// Reading the id does not postpone expiry; only [`touch`](Self::touch)
	/// does that.
	pub fn current_session_id(&self) -> SessionId {
		let now = self.clock.now();
		let (id, renewed) = {
			let mut state = self.state.lock().expect("session state poisoned");
			match &state.current {
				Some(current) if !current.is_expired(now, self.timeout) => (current.id, None),
				Some(_) => {
					let renewed = self.renew_locked(&mut state, now);
					(renewed.1, Some(renewed))
				}
				None => {
					let record = SessionRecord::new(now);
					let id = record.id;
					state.current = Some(record);
					debug!(session_id = %id, "session created");
					(id, None)
				}
			}
		};
		if let Some((old, new)) = renewed {
			self.notify_renewal(old, new);
		}
		id
	}

	/// Marks delivery activity, postponing idle expiry.
	pub fn touch(&self) {
		let now = self.clock.now();
		let mut state = self.state.lock().expect("session state poisoned");
		if let Some(current) = &mut state.current {
			current.last_used = now;
		}
	}

	/// Periodic expiry check: renews an idle-expired session and flushes any
	/// pending history archives to durable storage.
	pub async fn check_expiry(&self) -> Result<()> {
		let now = self.clock.now();
		let (renewed, pending) = {
			let mut state = self.state.lock().expect("session state poisoned");
			let renewed = match &state.current {
				Some(current) if current.is_expired(now, self.timeout) => {
					Some(self.renew_locked(&mut state, now))
				}
				_ => None,
			};
			(renewed, std::mem::take(&mut state.pending_archives))
		};

		if let Some((old, new)) = renewed {
			self.notify_renewal(old, new);
		}

		if !pending.is_empty() {
			let mut iter = pending.into_iter();
			while let Some(record) = iter.next() {
				if let Err(e) = self.store.put(SESSION_HISTORY_STORE, record.clone()).await {
					// Re-queue everything not yet persisted; the next pass
					// retries.
					let mut remaining = vec![record];
					remaining.extend(iter);
					let mut state = self.state.lock().expect("session state poisoned");
					remaining.append(&mut state.pending_archives);
					state.pending_archives = remaining;
					return Err(e);
				}
			}
			self.store
				.delete_oldest(SESSION_HISTORY_STORE, self.history_cap)
				.await?;
		}
		Ok(())
	}

	/// Owned, most-recent-first copy of the session history.
	pub fn history_snapshot(&self) -> Vec<SessionId> {
		self.state
			.lock()
			.expect("session state poisoned")
			.history
			.snapshot()
	}

	/// Archives the current session and issues a fresh id. Caller holds the
	/// state lock; the renewal hook must be invoked after it is released.
	fn renew_locked(
		&self,
		state: &mut SessionState,
		now: DateTime<Utc>,
	) -> (SessionId, SessionId) {
		let old = state
			.current
			.take()
			.expect("renewal requires a current session");
		state.history.push(old.id);
		state.pending_archives.push(json!({
			"id": old.id.to_string(),
			"archivedAt": now.to_rfc3339(),
		}));
		let record = SessionRecord::new(now);
		let new_id = record.id;
		state.current = Some(record);
		debug!(old_session_id = %old.id, new_session_id = %new_id, "session renewed");
		(old.id, new_id)
	}

	fn notify_renewal(&self, old: SessionId, new: SessionId) {
		if let Some(hook) = &self.renewal_hook {
			hook(old, new);
		}
	}
}
