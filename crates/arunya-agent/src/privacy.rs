// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Privacy gate: opt-out flag and do-not-track handling.
//!
//! A single durable boolean is the source of truth; collection defaults to
//! enabled unless the user has explicitly opted out or the host signals a
//! do-not-track preference. The gate is consulted before every observable
//! action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::error::Result;
use crate::store::{RecordStore, PRIVACY_STORE};

/// Consent state consulted before every observable action.
pub struct PrivacyGate {
	store: Arc<dyn RecordStore>,
	disabled: AtomicBool,
	do_not_track: bool,
}

impl PrivacyGate {
	/// Loads the stored opt-out flag and captures the host's do-not-track
	/// preference.
	///
	/// Do-not-track is read exactly once here and never re-evaluated: a user
	/// changing the browser-level preference mid-session takes effect on the
	/// next load. Known limitation, kept deliberately.
	pub async fn load(store: Arc<dyn RecordStore>, do_not_track: bool) -> Self {
		let disabled = match store.get(PRIVACY_STORE).await {
			Ok(records) => records
				.last()
				.and_then(|record| record.get("disabled"))
				.and_then(Value::as_bool)
				.unwrap_or(false),
			Err(e) => {
				warn!(error = %e, "failed to read privacy flag, defaulting to enabled");
				false
			}
		};
		Self {
			store,
			disabled: AtomicBool::new(disabled),
			do_not_track,
		}
	}

	/// Whether collection may proceed right now. Never a stale cache: the
	/// in-process flag is updated synchronously by [`set_disabled`](Self::set_disabled).
	pub fn is_enabled(&self) -> bool {
		!self.do_not_track && !self.disabled.load(Ordering::SeqCst)
	}

	/// The do-not-track preference captured at construction.
	pub fn do_not_track(&self) -> bool {
		self.do_not_track
	}

	/// Flips the opt-out flag, in memory first so the gate takes effect even
	/// when persistence fails, then durably (last record wins).
	pub async fn set_disabled(&self, disabled: bool) -> Result<()> {
		self.disabled.store(disabled, Ordering::SeqCst);
		self.store
			.put(PRIVACY_STORE, json!({ "disabled": disabled }))
			.await?;
		self.store.delete_oldest(PRIVACY_STORE, 1).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MemoryStore;

	#[tokio::test]
	async fn test_defaults_to_enabled() {
		let gate = PrivacyGate::load(Arc::new(MemoryStore::new()), false).await;
		assert!(gate.is_enabled());
	}

	#[tokio::test]
	async fn test_do_not_track_gates_collection() {
		let gate = PrivacyGate::load(Arc::new(MemoryStore::new()), true).await;
		assert!(!gate.is_enabled());

		// An explicit enable cannot override the browser preference.
		gate.set_disabled(false).await.unwrap();
		assert!(!gate.is_enabled());
	}

	#[tokio::test]
	async fn test_opt_out_persists() {
		let store = Arc::new(MemoryStore::new());

		let gate = PrivacyGate::load(store.clone(), false).await;
		gate.set_disabled(true).await.unwrap();
		assert!(!gate.is_enabled());

		let reloaded = PrivacyGate::load(store.clone(), false).await;
		assert!(!reloaded.is_enabled());

		// Last record wins and only one is retained.
		let records = store.get(PRIVACY_STORE).await.unwrap();
		assert_eq!(records.len(), 1);
	}

	#[tokio::test]
	async fn test_reenable_after_opt_out() {
		let store = Arc::new(MemoryStore::new());

		let gate = PrivacyGate::load(store.clone(), false).await;
		gate.set_disabled(true).await.unwrap();
		gate.set_disabled(false).await.unwrap();
		assert!(gate.is_enabled());

		let reloaded = PrivacyGate::load(store, false).await;
		assert!(reloaded.is_enabled());
	}

	#[tokio::test]
	async fn test_flag_applies_even_when_persistence_fails() {
		let store = Arc::new(MemoryStore::new());
		let gate = PrivacyGate::load(store.clone(), false).await;

		store.set_failing(true);
		assert!(gate.set_disabled(true).await.is_err());
		assert!(!gate.is_enabled());
	}
}
