// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The collection agent.
//!
//! `Agent` wires the privacy gate, session manager, DOM engine, and delivery
//! pipeline together and owns the timer-driven background tasks. Its public
//! surface is infallible: the agent must never let its own failure become
//! visible to the host page, so every failure path ends in a log line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use arunya_agent_core::{validate_event_name, EmbedConfig, EventKind, WebsiteId};

use crate::clock::{Clock, SystemClock};
use crate::compose::compose_event;
use crate::deliver::{BeaconTransport, DeliveryPipeline};
use crate::dom::{DomEngine, DomMutation, EventSink, HostPage};
use crate::privacy::PrivacyGate;
use crate::session::SessionManager;
use crate::store::RecordStore;

/// Composes and submits payloads for observed events.
///
/// Order per interaction: privacy check, throttle check, composition, send.
/// The first three are synchronous, so two payloads for one interaction can
/// never interleave; only the network I/O is deferred.
pub(crate) struct Dispatcher {
	host: Arc<dyn HostPage>,
	sessions: Arc<SessionManager>,
	pipeline: Arc<DeliveryPipeline>,
	privacy: Arc<PrivacyGate>,
	website_id: WebsiteId,
	clock: Arc<dyn Clock>,
}

impl Dispatcher {
	pub fn dispatch(&self, kind: EventKind) {
		if !self.privacy.is_enabled() {
			return;
		}
		// Throttle before composing to avoid wasted work.
		if !self.pipeline.admits(kind.throttle_key()) {
			debug!(event_type = %kind.throttle_key(), "event dropped by throttle");
			return;
		}
		let snapshot = self.host.snapshot();
		let payload = compose_event(
			kind,
			&snapshot,
			self.sessions.current_session_id(),
			self.sessions.history_snapshot(),
			self.website_id.clone(),
			self.clock.now(),
		);
		self.pipeline.send(payload);
	}
}

/// A mounted collection agent.
///
/// Construction is plain (`mount` takes every collaborator as a value), so
/// tests can run any number of independent instances; the process-wide
/// singleton lives in [`crate::global`], not here.
pub struct Agent {
	config: EmbedConfig,
	host: Arc<dyn HostPage>,
	sessions: Arc<SessionManager>,
	privacy: Arc<PrivacyGate>,
	engine: Arc<DomEngine>,
	dispatcher: Arc<Dispatcher>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
	running: AtomicBool,
}

impl Agent {
	/// Mounts the agent against a host page with the system clock.
	pub async fn mount(
		config: EmbedConfig,
		host: Arc<dyn HostPage>,
		store: Arc<dyn RecordStore>,
		beacon: Arc<dyn BeaconTransport>,
	) -> Arc<Self> {
		Self::mount_with_clock(config, host, store, beacon, Arc::new(SystemClock)).await
	}

	/// Mounts the agent with an explicit clock (deterministic tests).
	pub async fn mount_with_clock(
		config: EmbedConfig,
		host: Arc<dyn HostPage>,
		store: Arc<dyn RecordStore>,
		beacon: Arc<dyn BeaconTransport>,
		clock: Arc<dyn Clock>,
	) -> Arc<Self> {
		// Do-not-track is sampled once, here, alongside the stored flag.
		let privacy = Arc::new(PrivacyGate::load(Arc::clone(&store), host.do_not_track()).await);

		let sessions = Arc::new(SessionManager::new(
			store,
			Arc::clone(&clock),
			config.session_timeout,
			config.history_cap,
		));
		if let Err(e) = sessions.load().await {
			warn!(error = %e, "failed to load session history");
		}

		let pipeline = Arc::new(DeliveryPipeline::new(
			config.track_endpoint(),
			beacon,
			Arc::clone(&sessions),
			Arc::clone(&clock),
			config.throttle_window,
		));

		let dispatcher = Arc::new(Dispatcher {
			host: Arc::clone(&host),
			sessions: Arc::clone(&sessions),
			pipeline,
			privacy: Arc::clone(&privacy),
			website_id: config.website_id.clone(),
			clock,
		});

		let sink: EventSink = {
			let dispatcher = Arc::clone(&dispatcher);
			Arc::new(move |kind| dispatcher.dispatch(kind))
		};
		let engine = DomEngine::new(Arc::clone(&host), sink);

		let agent = Arc::new(Self {
			config,
			host,
			sessions,
			privacy,
			engine,
			dispatcher,
			tasks: Mutex::new(Vec::new()),
			running: AtomicBool::new(false),
		});

		if agent.privacy.is_enabled() {
			agent.start();
		} else {
			debug!("collection disabled at mount (opt-out or do-not-track)");
		}
		agent
	}

	/// Runs the initialization sequence: one page view + scan through the
	/// navigation handler, then the mutation, navigation, and expiry
	/// watchers. No-op when already running.
	fn start(self: &Arc<Self>) {
		if self.running.swap(true, Ordering::SeqCst) {
			return;
		}

		// Load and SPA navigation share one code path: the first call sees
		// no tracked location, emits the initial page view, and scans.
		self.engine.handle_navigation();

		let mut tasks = self.tasks.lock().expect("task list poisoned");

		let mutations = self.host.subscribe_mutations();
		let engine = Arc::clone(&self.engine);
		let debounce = self.config.rescan_debounce;
		tasks.push(tokio::spawn(async move {
			mutation_loop(mutations, engine, debounce).await;
		}));

		let (nav_tx, mut nav_rx) = mpsc::unbounded_channel::<()>();
		self.host.navigation_observer().install(Box::new(move || {
			let _ = nav_tx.send(());
		}));
		let engine = Arc::clone(&self.engine);
		tasks.push(tokio::spawn(async move {
			while nav_rx.recv().await.is_some() {
				engine.handle_navigation();
			}
		}));

		let sessions = Arc::clone(&self.sessions);
		let period = self.config.expiry_check_interval;
		tasks.push(tokio::spawn(async move {
			expiry_loop(sessions, period).await;
		}));
	}

	/// Cancels timers and observers. Safe to call repeatedly; a second call
	/// finds nothing to tear down.
	fn teardown(&self) {
		if !self.running.swap(false, Ordering::SeqCst) {
			return;
		}
		for task in self.tasks.lock().expect("task list poisoned").drain(..) {
			task.abort();
		}
		self.host.navigation_observer().uninstall();
		self.engine.reset();
		debug!("agent torn down");
	}

	/// Records a custom event. Invalid names are dropped with a log line;
	/// nothing is raised to the host.
	pub fn track(&self, name: &str, data: Option<Map<String, Value>>) {
		if let Err(e) = validate_event_name(name) {
			warn!(error = %e, "dropping custom event");
			return;
		}
		self.dispatcher.dispatch(EventKind::CustomEvent {
			name: name.to_string(),
			data: data.unwrap_or_default(),
		});
	}

	/// Records a page view for the current page state.
	pub fn track_page_view(&self) {
		let title = self.host.snapshot().title;
		self.dispatcher.dispatch(EventKind::PageView { title });
	}

	/// Opts out: persists the flag and tears down all listeners, observers,
	/// and timers. Idempotent.
	pub async fn disable(self: &Arc<Self>) {
		if let Err(e) = self.privacy.set_disabled(true).await {
			warn!(error = %e, "failed to persist opt-out");
		}
		self.teardown();
	}

	/// Opts back in: clears the flag and re-runs the initialization
	/// sequence. A do-not-track preference captured at mount still gates
	/// collection until the next load.
	pub async fn enable(self: &Arc<Self>) {
		if self.privacy.do_not_track() {
			debug!("do-not-track captured at mount; enable() deferred to next load");
			return;
		}
		if let Err(e) = self.privacy.set_disabled(false).await {
			warn!(error = %e, "failed to persist opt-in");
		}
		self.start();
	}

	/// Whether the observation machinery is currently running.
	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}
}

impl Drop for Agent {
	fn drop(&mut self) {
		for task in self.tasks.lock().expect("task list poisoned").drain(..) {
			task.abort();
		}
	}
}

/// Coalesces bursts of DOM additions into a single rescan after a quiet
/// period. Non-addition mutations never schedule a rescan.
async fn mutation_loop(
	mut mutations: mpsc::UnboundedReceiver<DomMutation>,
	engine: Arc<DomEngine>,
	quiet: Duration,
) {
	let mut pending = false;
	loop {
		if pending {
			tokio::select! {
				mutation = mutations.recv() => match mutation {
					// Any further activity restarts the quiet period.
					Some(_) => {}
					None => {
						engine.scan();
						break;
					}
				},
				_ = tokio::time::sleep(quiet) => {
					engine.scan();
					pending = false;
				}
			}
		} else {
			match mutations.recv().await {
				Some(DomMutation::NodesAdded) => pending = true,
				Some(_) => {}
				None => break,
			}
		}
	}
}

/// Periodic session expiry check.
async fn expiry_loop(sessions: Arc<SessionManager>, period: Duration) {
	let mut interval = tokio::time::interval(period);
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	loop {
		interval.tick().await;
		if let Err(e) = sessions.check_expiry().await {
			warn!(error = %e, "session expiry check failed");
		}
	}
}
