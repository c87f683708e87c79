// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Embeddable collection agent for Arunya product analytics.
//!
//! The agent observes user behavior in a host page it does not control —
//! page views, clicks, custom events — maintains a durable anonymous
//! session identity across loads, and delivers event records to a
//! collection endpoint under adverse network and privacy conditions.
//!
//! The host environment is reached only through traits ([`HostPage`],
//! [`DomElement`], [`NavigationObserver`], [`BeaconTransport`]), so the
//! agent is testable without a browser; `testing` ships in-memory fakes.
//! Delivery is best-effort: a beacon-style transport first, then a JSON
//! POST with bounded exponential-backoff retries, and failures are dropped
//! and logged — never raised into host-page code.

pub mod agent;
pub mod clock;
pub mod compose;
pub mod deliver;
pub mod dom;
pub mod error;
pub mod global;
pub mod privacy;
pub mod session;
pub mod store;
pub mod testing;

pub use agent::Agent;
pub use clock::{Clock, SystemClock};
pub use compose::compose_event;
pub use deliver::{BeaconTransport, DeliveryPipeline, NoBeacon};
pub use dom::{
	DomElement, DomEngine, DomMutation, HostPage, NavigationObserver, PageSnapshot,
};
pub use error::{AgentError, Result};
pub use privacy::PrivacyGate;
pub use session::{RenewalHook, SessionManager};
pub use store::{FallbackStore, JsonFileStore, RecordStore, SqliteStore};
