// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the core agent domain model.

use thiserror::Error;

/// Errors produced while validating or parsing core agent types.
#[derive(Debug, Error)]
pub enum CoreError {
	/// The embedding page did not supply a website identifier.
	#[error("website id is missing from the embed configuration")]
	MissingWebsiteId,

	/// The website identifier failed validation.
	#[error("invalid website id: {0:?}")]
	InvalidWebsiteId(String),

	/// A custom event name failed validation.
	#[error("invalid event name: {0:?}")]
	InvalidEventName(String),

	/// The script source URL could not be parsed into an endpoint origin.
	#[error("invalid script source URL: {0}")]
	InvalidScriptSrc(String),

	/// A session id could not be parsed.
	#[error("invalid session id: {0}")]
	InvalidSessionId(#[from] uuid::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
