// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! DOM observation engine.
//!
//! The host environment is reached only through the traits in this module:
//! [`HostPage`] for document access and mutation notifications,
//! [`DomElement`] for individual elements, and [`NavigationObserver`] for
//! SPA navigation detection. Browser bindings implement these by wrapping
//! the history-mutation entry points and the native navigation events; the
//! engine itself depends on nothing but a callback, so it is fully testable
//! against the fakes in [`crate::testing`].

mod data_attrs;
mod scan;

pub use data_attrs::{extract_event_data, normalize_attr_key, DATA_ATTR_PREFIX, EVENT_ATTR, ID_ATTR};
pub use scan::is_interactive;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use arunya_agent_core::EventKind;

use scan::TrackedRegistry;

/// Handler attached to a tracked element, invoked on click.
pub type ClickHandler = Arc<dyn Fn() + Send + Sync>;

/// A live element of the host document.
pub trait DomElement: Send + Sync {
	/// Tag name, case-insensitive.
	fn tag(&self) -> String;

	fn attr(&self, name: &str) -> Option<String>;

	fn set_attr(&self, name: &str, value: &str);

	/// All attributes as (name, value) pairs.
	fn attrs(&self) -> Vec<(String, String)>;

	/// Attaches the element's click handler, replacing any previous one.
	fn set_click_handler(&self, handler: ClickHandler);
}

/// A DOM mutation reported by the host. Only additions trigger a rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomMutation {
	NodesAdded,
	NodesRemoved,
	AttributesChanged,
}

/// Detects single-page-application navigation.
///
/// Implementations wrap the two history-mutation entry points and listen
/// for the two native navigation events, invoking the callback on any of
/// them. The engine decides whether the location actually changed.
pub trait NavigationObserver: Send + Sync {
	fn install(&self, on_navigate: Box<dyn Fn() + Send + Sync>);

	/// Removes the installed callback. Idempotent.
	fn uninstall(&self);
}

/// Context captured from the page at one instant.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
	pub hostname: String,
	pub path: String,
	pub query: String,
	pub referrer: String,
	pub screen_width: u32,
	pub screen_height: u32,
	/// IANA timezone name, e.g. `Europe/Berlin`.
	pub timezone: String,
	pub title: String,
}

impl PageSnapshot {
	/// Normalized path plus query, the identity used for navigation
	/// deduplication.
	pub fn location(&self) -> String {
		if self.query.is_empty() {
			self.path.clone()
		} else {
			format!("{}?{}", self.path, self.query)
		}
	}
}

/// The host document as seen by the engine.
pub trait HostPage: Send + Sync {
	/// All elements of the document, in document order.
	fn elements(&self) -> Vec<Arc<dyn DomElement>>;

	/// Current page context.
	fn snapshot(&self) -> PageSnapshot;

	/// The browser-level do-not-track preference. Read once at agent
	/// construction, never re-evaluated.
	fn do_not_track(&self) -> bool;

	/// Subscribes to DOM mutation notifications.
	fn subscribe_mutations(&self) -> mpsc::UnboundedReceiver<DomMutation>;

	/// The page's navigation observer.
	fn navigation_observer(&self) -> Arc<dyn NavigationObserver>;
}

/// Sink receiving the variant half of an observed event; the dispatcher
/// composes the full payload.
pub(crate) type EventSink = Arc<dyn Fn(EventKind) + Send + Sync>;

/// Scans the document, attaches click handlers, and folds navigation into
/// synthetic page views.
pub struct DomEngine {
	host: Arc<dyn HostPage>,
	sink: EventSink,
	registry: Mutex<TrackedRegistry>,
	last_location: Mutex<Option<String>>,
}

impl DomEngine {
	pub(crate) fn new(host: Arc<dyn HostPage>, sink: EventSink) -> Arc<Self> {
		Arc::new(Self {
			host,
			sink,
			registry: Mutex::new(TrackedRegistry::new()),
			last_location: Mutex::new(None),
		})
	}

	/// One scan pass: assign identifiers to matched elements lacking one and
	/// attach a click handler to each element not yet tracked.
	///
	/// Identifiers are unique within a single pass only; a re-scan restarts
	/// the index. Already-tracked elements are left untouched, so a second
	/// pass never attaches a second handler.
	pub fn scan(self: &Arc<Self>) {
		let elements = self.host.elements();
		let mut registry = self.registry.lock().expect("registry poisoned");
		registry.prune();

		let mut index = 0usize;
		let mut attached = 0usize;
		for element in elements {
			if !is_interactive(element.as_ref()) {
				continue;
			}
			if element.attr(ID_ATTR).is_none() {
				let id = format!("{}-{}", element.tag().to_ascii_lowercase(), index);
				element.set_attr(ID_ATTR, &id);
			}
			index += 1;

			if registry.is_tracked(&element) {
				continue;
			}
			element.set_click_handler(self.click_handler_for(&element));
			registry.track(&element);
			attached += 1;
		}
		debug!(matched = index, attached, "scan pass complete");
	}

	/// Reacts to a navigation signal: if the normalized location changed
	/// since the last tracked one, emits exactly one synthetic page view and
	/// runs one rescan. Unchanged locations are no-ops.
	pub fn handle_navigation(self: &Arc<Self>) {
		let snapshot = self.host.snapshot();
		let location = snapshot.location();
		{
			let mut last = self.last_location.lock().expect("location poisoned");
			if last.as_deref() == Some(location.as_str()) {
				return;
			}
			*last = Some(location);
		}
		(self.sink)(EventKind::PageView {
			title: snapshot.title,
		});
		self.scan();
	}

	/// Drops all tracking state. Used on teardown; a later re-enable starts
	/// from a clean scan.
	pub fn reset(&self) {
		self.registry.lock().expect("registry poisoned").clear();
		*self.last_location.lock().expect("location poisoned") = None;
	}

	fn click_handler_for(self: &Arc<Self>, element: &Arc<dyn DomElement>) -> ClickHandler {
		// The handler holds the element weakly: it must not keep a removed
		// element alive, and the registry relies on the element's lifetime.
		let weak = Arc::downgrade(element);
		let sink = Arc::clone(&self.sink);
		Arc::new(move || {
			let Some(element) = weak.upgrade() else {
				return;
			};
			sink(classify_click(element.as_ref()));
		})
	}
}

/// Maps a clicked element to its event variant.
fn classify_click(element: &dyn DomElement) -> EventKind {
	if let Some(name) = element.attr(EVENT_ATTR) {
		EventKind::CustomEvent {
			name,
			data: extract_event_data(&element.attrs()),
		}
	} else {
		let target = element
			.attr(ID_ATTR)
			.unwrap_or_else(|| "unknown".to_string());
		EventKind::Click { target }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{FakeElement, FakePage};

	fn collecting_engine(page: &Arc<FakePage>) -> (Arc<DomEngine>, Arc<Mutex<Vec<EventKind>>>) {
		let events: Arc<Mutex<Vec<EventKind>>> = Arc::new(Mutex::new(Vec::new()));
		let sink_events = events.clone();
		let sink: EventSink = Arc::new(move |kind| {
			sink_events.lock().unwrap().push(kind);
		});
		let engine = DomEngine::new(page.clone() as Arc<dyn HostPage>, sink);
		(engine, events)
	}

	#[tokio::test]
	async fn test_scan_assigns_ids_in_scan_order() {
		let page = FakePage::new();
		let button = FakeElement::new("button", &[]);
		let link = FakeElement::new("a", &[("href", "/x")]);
		let plain = FakeElement::new("div", &[]);
		page.add_element(button.clone());
		page.add_element(plain);
		page.add_element(link.clone());

		let (engine, _) = collecting_engine(&page);
		engine.scan();

		assert_eq!(button.attr(ID_ATTR).unwrap(), "button-0");
		assert_eq!(link.attr(ID_ATTR).unwrap(), "a-1");
	}

	#[tokio::test]
	async fn test_scan_preserves_existing_ids() {
		let page = FakePage::new();
		let button = FakeElement::new("button", &[(ID_ATTR, "checkout")]);
		page.add_element(button.clone());

		let (engine, _) = collecting_engine(&page);
		engine.scan();

		assert_eq!(button.attr(ID_ATTR).unwrap(), "checkout");
	}

	#[tokio::test]
	async fn test_second_scan_does_not_reattach() {
		let page = FakePage::new();
		let button = FakeElement::new("button", &[]);
		page.add_element(button.clone());

		let (engine, events) = collecting_engine(&page);
		engine.scan();
		engine.scan();

		assert_eq!(button.handler_installs(), 1);

		button.click();
		assert_eq!(events.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_click_dispatches_assigned_identifier() {
		let page = FakePage::new();
		let button = FakeElement::new("button", &[]);
		page.add_element(button.clone());

		let (engine, events) = collecting_engine(&page);
		engine.scan();
		button.click();

		let events = events.lock().unwrap();
		assert_eq!(
			*events,
			vec![EventKind::Click {
				target: "button-0".to_string()
			}]
		);
	}

	#[tokio::test]
	async fn test_click_on_custom_event_element() {
		let page = FakePage::new();
		let button = FakeElement::new(
			"button",
			&[
				(EVENT_ATTR, "signup"),
				("data-arunya-plan", r#"{"tier":"pro"}"#),
			],
		);
		page.add_element(button.clone());

		let (engine, events) = collecting_engine(&page);
		engine.scan();
		button.click();

		let events = events.lock().unwrap();
		match &events[0] {
			EventKind::CustomEvent { name, data } => {
				assert_eq!(name, "signup");
				assert_eq!(data["plan"]["tier"], "pro");
			}
			other => panic!("expected custom event, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_navigation_emits_once_per_distinct_location() {
		let page = FakePage::new();
		let (engine, events) = collecting_engine(&page);

		engine.handle_navigation();
		engine.handle_navigation();

		page.navigate("/pricing", "", "Pricing");
		engine.handle_navigation();
		engine.handle_navigation();

		let events = events.lock().unwrap();
		let page_views: Vec<_> = events
			.iter()
			.filter(|e| matches!(e, EventKind::PageView { .. }))
			.collect();
		assert_eq!(page_views.len(), 2);
	}

	#[tokio::test]
	async fn test_query_change_counts_as_navigation() {
		let page = FakePage::new();
		let (engine, events) = collecting_engine(&page);

		engine.handle_navigation();
		page.navigate("/", "tab=2", "Home");
		engine.handle_navigation();

		assert_eq!(events.lock().unwrap().len(), 2);
	}

	#[tokio::test]
	async fn test_removed_element_click_is_inert() {
		let page = FakePage::new();
		let button = FakeElement::new("button", &[]);
		page.add_element(button.clone());

		let (engine, events) = collecting_engine(&page);
		engine.scan();

		page.remove_element(&button);
		// The page dropped its reference; only the test's Arc remains, and
		// the handler holds the element weakly.
		let handler = button.take_handler().unwrap();
		drop(button);
		handler();

		assert!(events.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_reset_clears_tracking() {
		let page = FakePage::new();
		let button = FakeElement::new("button", &[]);
		page.add_element(button.clone());

		let (engine, _) = collecting_engine(&page);
		engine.scan();
		engine.reset();
		engine.scan();

		// After a reset the element is re-tracked (fresh handler).
		assert_eq!(button.handler_installs(), 2);
	}
}
