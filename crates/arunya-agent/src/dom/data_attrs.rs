// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Extraction of custom-event data from reserved `data-arunya-*` attributes.
//!
//! The rule is data, not code branches: a prefix match, an exclusion list,
//! a key normalization, and a value parse. Keeping it enumerable keeps it
//! independently testable.

use serde_json::{Map, Value};

/// Reserved attribute prefix for the agent.
pub const DATA_ATTR_PREFIX: &str = "data-arunya-";
/// Attribute naming a custom event; its presence makes a click dispatch as
/// that event.
pub const EVENT_ATTR: &str = "data-arunya-event";
/// Attribute carrying an element's assigned identifier.
pub const ID_ATTR: &str = "data-arunya-id";

/// Attributes never copied into the data bag.
const EXCLUDED_ATTRS: [&str; 2] = [EVENT_ATTR, ID_ATTR];

/// Builds a custom event's data bag from an element's attributes.
///
/// Every attribute under the reserved prefix is included except the
/// event-name and id attributes themselves. Keys are normalized from
/// camelCase to hyphenated form and stripped of the prefix; values that are
/// syntactically bracketed by `{`/`}` are JSON-parsed, falling back to the
/// raw string when the parse fails.
pub fn extract_event_data(attrs: &[(String, String)]) -> Map<String, Value> {
	let mut data = Map::new();
	for (name, value) in attrs {
		let normalized = normalize_attr_key(name);
		if !normalized.starts_with(DATA_ATTR_PREFIX) {
			continue;
		}
		if EXCLUDED_ATTRS.contains(&normalized.as_str()) {
			continue;
		}
		let key = normalized[DATA_ATTR_PREFIX.len()..].to_string();
		data.insert(key, parse_attr_value(value));
	}
	data
}

/// Normalizes a camelCase attribute key to hyphenated form:
/// `arunyaPlanName` becomes `arunya-plan-name`.
pub fn normalize_attr_key(key: &str) -> String {
	let mut out = String::with_capacity(key.len() + 4);
	for c in key.chars() {
		if c.is_ascii_uppercase() {
			out.push('-');
			out.push(c.to_ascii_lowercase());
		} else {
			out.push(c);
		}
	}
	out
}

fn parse_attr_value(raw: &str) -> Value {
	let trimmed = raw.trim();
	if trimmed.starts_with('{') && trimmed.ends_with('}') {
		serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(raw.to_string()))
	} else {
		Value::String(raw.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn test_extracts_prefixed_attributes_only() {
		let data = extract_event_data(&attrs(&[
			("data-arunya-plan", "pro"),
			("data-other", "ignored"),
			("class", "btn"),
		]));

		assert_eq!(data.len(), 1);
		assert_eq!(data["plan"], "pro");
	}

	#[test]
	fn test_excludes_event_and_id_attributes() {
		let data = extract_event_data(&attrs(&[
			(EVENT_ATTR, "signup"),
			(ID_ATTR, "button-0"),
			("data-arunya-source", "nav"),
		]));

		assert_eq!(data.len(), 1);
		assert_eq!(data["source"], "nav");
	}

	#[test]
	fn test_json_values_are_parsed() {
		let data = extract_event_data(&attrs(&[(
			"data-arunya-plan",
			r#"{"tier":"pro"}"#,
		)]));

		assert_eq!(data["plan"]["tier"], "pro");
	}

	#[test]
	fn test_malformed_json_falls_back_to_raw_string() {
		let data = extract_event_data(&attrs(&[("data-arunya-plan", "{not json")]));
		assert_eq!(data["plan"], "{not json");

		let data = extract_event_data(&attrs(&[("data-arunya-plan", "{broken}")]));
		assert_eq!(data["plan"], "{broken}");
	}

	#[test]
	fn test_non_bracketed_values_stay_strings() {
		let data = extract_event_data(&attrs(&[("data-arunya-count", "42")]));
		assert_eq!(data["count"], "42");
	}

	#[test]
	fn test_camel_case_keys_normalize() {
		assert_eq!(normalize_attr_key("arunyaPlanName"), "arunya-plan-name");
		assert_eq!(normalize_attr_key("data-arunya-plan"), "data-arunya-plan");

		let data = extract_event_data(&attrs(&[("data-arunyaPlanName", "x")]));
		assert_eq!(data.len(), 1);
		assert_eq!(data["plan-name"], "x");
	}

	#[test]
	fn test_signup_extraction() {
		let data = extract_event_data(&attrs(&[
			(EVENT_ATTR, "signup"),
			("data-arunya-plan", r#"{"tier":"pro"}"#),
		]));

		assert_eq!(data.len(), 1);
		assert_eq!(data["plan"], serde_json::json!({"tier": "pro"}));
	}
}
