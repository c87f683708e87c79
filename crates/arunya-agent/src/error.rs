// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the agent runtime.
//!
//! None of these ever cross the host boundary: the public agent API is
//! infallible and every failure path terminates in a log line. The enum
//! exists for the internal plumbing, where fallbacks and retries need to
//! classify what went wrong.

use arunya_agent_core::CoreError;
use arunya_common_http::RetryableError;
use thiserror::Error;

/// Agent runtime errors.
#[derive(Debug, Error)]
pub enum AgentError {
	/// The embed configuration is invalid.
	#[error("invalid embed configuration: {0}")]
	Config(#[from] CoreError),

	/// The primary (transactional) store failed.
	#[error("primary store error: {0}")]
	Database(#[from] sqlx::Error),

	/// The fallback store failed at the filesystem level.
	#[error("store I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// A record or payload could not be (de)serialized.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// The collection endpoint returned a non-success status.
	#[error("server error ({status})")]
	ServerError { status: u16 },

	/// No storage backend could serve the operation.
	#[error("storage backend unavailable")]
	StorageUnavailable,
}

impl RetryableError for AgentError {
	fn is_retryable(&self) -> bool {
		match self {
			AgentError::RequestFailed(e) => e.is_retryable(),
			AgentError::ServerError { status } => {
				matches!(*status, 429 | 408 | 500 | 502 | 503 | 504)
			}
			_ => false,
		}
	}
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
