// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Website identifier type.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const MAX_WEBSITE_ID_LENGTH: usize = 200;

/// Identifier of the website a payload belongs to.
///
/// Supplied by the embedding page via the `data-website-id` script-tag
/// attribute and echoed verbatim on every payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebsiteId(String);

impl WebsiteId {
	/// Creates a website id, validating its format.
	///
	/// Accepted ids are non-empty, at most 200 characters, and limited to
	/// alphanumerics plus `_`, `-` and `.`.
	pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
		let id = id.into();
		if Self::is_valid(&id) {
			Ok(Self(id))
		} else {
			Err(CoreError::InvalidWebsiteId(id))
		}
	}

	/// Validates a website id without constructing one.
	pub fn is_valid(id: &str) -> bool {
		if id.is_empty() || id.len() > MAX_WEBSITE_ID_LENGTH {
			return false;
		}
		id.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for WebsiteId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for WebsiteId {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
