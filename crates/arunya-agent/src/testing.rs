// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host-environment test doubles.
//!
//! Embedders (and this crate's own tests) drive the agent against these
//! instead of a browser: an in-memory page with synthetic clicks and
//! navigation, a manual clock for deterministic expiry and throttling, an
//! in-memory record store, and a capturing beacon transport.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::clock::Clock;
use crate::deliver::BeaconTransport;
use crate::dom::{
	ClickHandler, DomElement, DomMutation, HostPage, NavigationObserver, PageSnapshot,
};
use crate::error::{AgentError, Result};
use crate::store::RecordStore;

/// Clock that only moves when told to.
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
	pub fn new() -> Self {
		Self {
			now: Mutex::new(DateTime::from_timestamp(1_700_000_000, 0).expect("valid epoch")),
		}
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap();
		*now += chrono::Duration::from_std(by).expect("advance within range");
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap()
	}
}

/// In-memory record store with a failure toggle for exercising fallback and
/// drop-and-log paths.
#[derive(Default)]
pub struct MemoryStore {
	records: Mutex<HashMap<String, Vec<Value>>>,
	failing: AtomicBool,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// When set, every operation fails with `StorageUnavailable`.
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	fn check(&self) -> Result<()> {
		if self.failing.load(Ordering::SeqCst) {
			Err(AgentError::StorageUnavailable)
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl RecordStore for MemoryStore {
	async fn get(&self, store: &str) -> Result<Vec<Value>> {
		self.check()?;
		Ok(self
			.records
			.lock()
			.unwrap()
			.get(store)
			.cloned()
			.unwrap_or_default())
	}

	async fn put(&self, store: &str, record: Value) -> Result<()> {
		self.check()?;
		self.records
			.lock()
			.unwrap()
			.entry(store.to_string())
			.or_default()
			.push(record);
		Ok(())
	}

	async fn delete_oldest(&self, store: &str, keep: usize) -> Result<()> {
		self.check()?;
		if let Some(records) = self.records.lock().unwrap().get_mut(store) {
			if records.len() > keep {
				let excess = records.len() - keep;
				records.drain(..excess);
			}
		}
		Ok(())
	}
}

/// An element of the fake page.
pub struct FakeElement {
	tag: String,
	attrs: Mutex<BTreeMap<String, String>>,
	handler: Mutex<Option<ClickHandler>>,
	installs: Mutex<usize>,
}

impl FakeElement {
	pub fn new(tag: &str, attrs: &[(&str, &str)]) -> Arc<Self> {
		Arc::new(Self {
			tag: tag.to_string(),
			attrs: Mutex::new(
				attrs
					.iter()
					.map(|(k, v)| (k.to_string(), v.to_string()))
					.collect(),
			),
			handler: Mutex::new(None),
			installs: Mutex::new(0),
		})
	}

	/// Synthesizes a click, invoking the attached handler if any.
	pub fn click(&self) {
		let handler = self.handler.lock().unwrap().clone();
		if let Some(handler) = handler {
			handler();
		}
	}

	/// How many times a click handler has been attached.
	pub fn handler_installs(&self) -> usize {
		*self.installs.lock().unwrap()
	}

	/// Detaches and returns the handler, for lifetime tests.
	pub fn take_handler(&self) -> Option<ClickHandler> {
		self.handler.lock().unwrap().take()
	}
}

impl DomElement for FakeElement {
	fn tag(&self) -> String {
		self.tag.clone()
	}

	fn attr(&self, name: &str) -> Option<String> {
		self.attrs.lock().unwrap().get(name).cloned()
	}

	fn set_attr(&self, name: &str, value: &str) {
		self.attrs
			.lock()
			.unwrap()
			.insert(name.to_string(), value.to_string());
	}

	fn attrs(&self) -> Vec<(String, String)> {
		self.attrs
			.lock()
			.unwrap()
			.iter()
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect()
	}

	fn set_click_handler(&self, handler: ClickHandler) {
		*self.handler.lock().unwrap() = Some(handler);
		*self.installs.lock().unwrap() += 1;
	}
}

/// Navigation observer double with a manual trigger.
#[derive(Default)]
pub struct FakeNavigation {
	callback: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl FakeNavigation {
	/// Fires the installed callback, as the host would on a history
	/// mutation or native navigation event.
	pub fn trigger(&self) {
		if let Some(callback) = &*self.callback.lock().unwrap() {
			callback();
		}
	}

	pub fn is_installed(&self) -> bool {
		self.callback.lock().unwrap().is_some()
	}
}

impl NavigationObserver for FakeNavigation {
	fn install(&self, on_navigate: Box<dyn Fn() + Send + Sync>) {
		*self.callback.lock().unwrap() = Some(on_navigate);
	}

	fn uninstall(&self) {
		*self.callback.lock().unwrap() = None;
	}
}

/// In-memory host page.
pub struct FakePage {
	elements: Mutex<Vec<Arc<FakeElement>>>,
	snapshot: Mutex<PageSnapshot>,
	do_not_track: AtomicBool,
	mutation_subscribers: Mutex<Vec<mpsc::UnboundedSender<DomMutation>>>,
	navigation: Arc<FakeNavigation>,
}

impl FakePage {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			elements: Mutex::new(Vec::new()),
			snapshot: Mutex::new(PageSnapshot {
				hostname: "example.com".to_string(),
				path: "/".to_string(),
				query: String::new(),
				referrer: String::new(),
				screen_width: 1280,
				screen_height: 800,
				timezone: "UTC".to_string(),
				title: "Home".to_string(),
			}),
			do_not_track: AtomicBool::new(false),
			mutation_subscribers: Mutex::new(Vec::new()),
			navigation: Arc::new(FakeNavigation::default()),
		})
	}

	/// Adds an element and notifies mutation subscribers of the addition.
	pub fn add_element(&self, element: Arc<FakeElement>) {
		self.elements.lock().unwrap().push(element);
		self.notify(DomMutation::NodesAdded);
	}

	/// Adds an element without a mutation notification (e.g. content swapped
	/// in during an SPA navigation, observed only through the rescan).
	pub fn add_element_silently(&self, element: Arc<FakeElement>) {
		self.elements.lock().unwrap().push(element);
	}

	/// Removes an element and notifies mutation subscribers of the removal.
	pub fn remove_element(&self, element: &Arc<FakeElement>) {
		self.elements
			.lock()
			.unwrap()
			.retain(|existing| !Arc::ptr_eq(existing, element));
		self.notify(DomMutation::NodesRemoved);
	}

	pub fn set_do_not_track(&self, dnt: bool) {
		self.do_not_track.store(dnt, Ordering::SeqCst);
	}

	/// Simulates an SPA navigation: updates the location and fires the
	/// navigation observer.
	pub fn navigate(&self, path: &str, query: &str, title: &str) {
		{
			let mut snapshot = self.snapshot.lock().unwrap();
			snapshot.path = path.to_string();
			snapshot.query = query.to_string();
			snapshot.title = title.to_string();
		}
		self.navigation.trigger();
	}

	pub fn set_referrer(&self, referrer: &str) {
		self.snapshot.lock().unwrap().referrer = referrer.to_string();
	}

	pub fn navigation(&self) -> Arc<FakeNavigation> {
		Arc::clone(&self.navigation)
	}

	fn notify(&self, mutation: DomMutation) {
		self.mutation_subscribers
			.lock()
			.unwrap()
			.retain(|subscriber| subscriber.send(mutation).is_ok());
	}
}

impl HostPage for FakePage {
	fn elements(&self) -> Vec<Arc<dyn DomElement>> {
		self.elements
			.lock()
			.unwrap()
			.iter()
			.map(|element| Arc::clone(element) as Arc<dyn DomElement>)
			.collect()
	}

	fn snapshot(&self) -> PageSnapshot {
		self.snapshot.lock().unwrap().clone()
	}

	fn do_not_track(&self) -> bool {
		self.do_not_track.load(Ordering::SeqCst)
	}

	fn subscribe_mutations(&self) -> mpsc::UnboundedReceiver<DomMutation> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.mutation_subscribers.lock().unwrap().push(tx);
		rx
	}

	fn navigation_observer(&self) -> Arc<dyn NavigationObserver> {
		Arc::clone(&self.navigation) as Arc<dyn NavigationObserver>
	}
}

/// Beacon transport double.
///
/// `accepting()` takes everything; `with_max_bytes` refuses payloads over
/// the cap, mimicking a browser beacon size limit; `refusing()` refuses
/// everything, as on a host without the primitive.
pub struct MockBeacon {
	max_bytes: Option<usize>,
	accept: bool,
	sent: Mutex<Vec<Vec<u8>>>,
}

impl MockBeacon {
	pub fn accepting() -> Self {
		Self {
			max_bytes: None,
			accept: true,
			sent: Mutex::new(Vec::new()),
		}
	}

	pub fn refusing() -> Self {
		Self {
			max_bytes: None,
			accept: false,
			sent: Mutex::new(Vec::new()),
		}
	}

	pub fn with_max_bytes(max_bytes: usize) -> Self {
		Self {
			max_bytes: Some(max_bytes),
			accept: true,
			sent: Mutex::new(Vec::new()),
		}
	}

	pub fn sent(&self) -> Vec<Vec<u8>> {
		self.sent.lock().unwrap().clone()
	}

	pub fn sent_count(&self) -> usize {
		self.sent.lock().unwrap().len()
	}
}

impl BeaconTransport for MockBeacon {
	fn send(&self, _endpoint: &Url, body: &[u8]) -> bool {
		if !self.accept {
			return false;
		}
		if let Some(max) = self.max_bytes {
			if body.len() > max {
				return false;
			}
		}
		self.sent.lock().unwrap().push(body.to_vec());
		true
	}
}
