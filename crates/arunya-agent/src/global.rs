// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide agent installation.
//!
//! The host integration calls [`install_from_embed`] once at script
//! evaluation; the free functions mirror the runtime API exposed to host
//! pages (`track`, `trackPageView`, `enable`, `disable`). The [`Agent`]
//! type itself holds no global state — tests construct as many independent
//! instances as they like — only this module pins one instance for the
//! process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use arunya_agent_core::EmbedConfig;

use crate::agent::Agent;
use crate::deliver::{BeaconTransport, NoBeacon};
use crate::dom::HostPage;
use crate::store::{FallbackStore, RecordStore};

static AGENT: OnceLock<Arc<Agent>> = OnceLock::new();

/// Mounts and pins the process-wide agent. A second call is ignored and
/// returns the existing instance.
pub async fn install(
	config: EmbedConfig,
	host: Arc<dyn HostPage>,
	store: Arc<dyn RecordStore>,
	beacon: Arc<dyn BeaconTransport>,
) -> Arc<Agent> {
	if let Some(existing) = AGENT.get() {
		warn!("agent already installed, reusing existing instance");
		return Arc::clone(existing);
	}
	let agent = Agent::mount(config, host, store, beacon).await;
	Arc::clone(AGENT.get_or_init(|| agent))
}

/// Entry point for the script-tag integration: parses the embed attributes,
/// opens durable storage under `data_dir`, and installs the agent.
///
/// Malformed configuration (a missing website id, an unusable script `src`)
/// is fatal to initialization but never propagates: the error is logged and
/// no agent is mounted.
pub async fn install_from_embed(
	attrs: &HashMap<String, String>,
	script_src: &str,
	host: Arc<dyn HostPage>,
	data_dir: &Path,
) -> Option<Arc<Agent>> {
	let config = match EmbedConfig::from_embed_attributes(attrs, script_src) {
		Ok(config) => config,
		Err(e) => {
			error!(error = %e, "invalid embed configuration, agent not mounted");
			return None;
		}
	};
	let store: Arc<dyn RecordStore> = Arc::new(FallbackStore::open(data_dir).await);
	Some(install(config, host, store, Arc::new(NoBeacon)).await)
}

/// The installed agent, if any.
pub fn installed() -> Option<Arc<Agent>> {
	AGENT.get().map(Arc::clone)
}

/// Records a custom event on the installed agent; a no-op before install.
pub fn track(name: &str, data: Option<Map<String, Value>>) {
	match installed() {
		Some(agent) => agent.track(name, data),
		None => debug!("track() before install, ignored"),
	}
}

/// Records a page view on the installed agent; a no-op before install.
pub fn track_page_view() {
	match installed() {
		Some(agent) => agent.track_page_view(),
		None => debug!("trackPageView() before install, ignored"),
	}
}

/// Opts the installed agent back in; a no-op before install.
pub async fn enable() {
	match installed() {
		Some(agent) => agent.enable().await,
		None => debug!("enable() before install, ignored"),
	}
}

/// Opts the installed agent out; a no-op before install.
pub async fn disable() {
	match installed() {
		Some(agent) => agent.disable().await,
		None => debug!("disable() before install, ignored"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{FakePage, MemoryStore};
	use arunya_agent_core::WebsiteId;
	use url::Url;

	// The OnceLock is process-global, so everything global lives in one test.
	#[tokio::test]
	async fn test_install_pins_one_instance() {
		let config = EmbedConfig::new(
			WebsiteId::new("abc123").unwrap(),
			Url::parse("https://stats.example.com").unwrap(),
		);

		let first = install(
			config.clone(),
			FakePage::new(),
			Arc::new(MemoryStore::new()),
			Arc::new(NoBeacon),
		)
		.await;
		let second = install(
			config,
			FakePage::new(),
			Arc::new(MemoryStore::new()),
			Arc::new(NoBeacon),
		)
		.await;

		assert!(Arc::ptr_eq(&first, &second));
		assert!(installed().is_some());

		// The free functions delegate without panicking.
		track("noop", None);
		track_page_view();
	}
}
