// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Arunya collection agent.
//!
//! This crate holds the pure domain model shared by the agent runtime and
//! any future server-side consumers: website and session identifiers, the
//! bounded session history, the event payload union, and the embed
//! configuration parsed from the host page's script tag. It performs no I/O.

pub mod config;
pub mod error;
pub mod event;
pub mod session;
pub mod website;

pub use config::{EmbedConfig, DEFAULT_SESSION_TIMEOUT};
pub use error::{CoreError, Result};
pub use event::{validate_event_name, EventKind, EventPayload, PageUrl, ScreenSize};
pub use session::{SessionHistory, SessionId, SessionRecord, DEFAULT_HISTORY_CAP};
pub use website::WebsiteId;
