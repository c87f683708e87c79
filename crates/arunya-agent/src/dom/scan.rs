// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Interactivity matching and the tracked-element registry.

use std::sync::{Arc, Weak};

use super::{DomElement, EVENT_ATTR};

/// Tags that are interactive regardless of attributes.
const INTERACTIVE_TAGS: [&str; 2] = ["button", "a"];
/// `input` types that are interactive.
const INTERACTIVE_INPUT_TYPES: [&str; 3] = ["submit", "button", "reset"];

/// Whether an element matches the fixed interactive selector set: buttons,
/// anchors, submit/button/reset inputs, an explicit click role or `onclick`
/// attribute, or the custom-event attribute.
pub fn is_interactive(element: &dyn DomElement) -> bool {
	let tag = element.tag().to_ascii_lowercase();
	if INTERACTIVE_TAGS.contains(&tag.as_str()) {
		return true;
	}
	if tag == "input" {
		if let Some(input_type) = element.attr("type") {
			if INTERACTIVE_INPUT_TYPES.contains(&input_type.to_ascii_lowercase().as_str()) {
				return true;
			}
		}
	}
	if element.attr("role").as_deref() == Some("button") {
		return true;
	}
	if element.attr("onclick").is_some() {
		return true;
	}
	element.attr(EVENT_ATTR).is_some()
}

/// Ownership relation between live elements and their attached handlers.
///
/// Entries are weak: a removed element's entry dies with it and is pruned on
/// the next scan. The registry is consulted only to avoid double-attaching;
/// it is never iterated as state.
pub(crate) struct TrackedRegistry {
	entries: Vec<Weak<dyn DomElement>>,
}

impl TrackedRegistry {
	pub fn new() -> Self {
		Self {
			entries: Vec::new(),
		}
	}

	/// Drops entries whose elements are gone.
	pub fn prune(&mut self) {
		self.entries.retain(|weak| weak.strong_count() > 0);
	}

	pub fn is_tracked(&self, element: &Arc<dyn DomElement>) -> bool {
		let needle = Arc::as_ptr(element) as *const ();
		self.entries
			.iter()
			.any(|weak| weak.as_ptr() as *const () == needle)
	}

	pub fn track(&mut self, element: &Arc<dyn DomElement>) {
		self.entries.push(Arc::downgrade(element));
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.entries.len()
	}
}
