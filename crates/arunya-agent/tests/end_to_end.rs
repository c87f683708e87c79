// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end agent tests: a fake host page driving real HTTP delivery
//! against a mock collection endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use arunya_agent::testing::{FakeElement, FakePage, ManualClock, MemoryStore};
use arunya_agent::{Agent, DomElement, NoBeacon};
use arunya_agent_core::{EmbedConfig, WebsiteId};

async fn collection_endpoint() -> MockServer {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/api/track"))
		.respond_with(ResponseTemplate::new(200))
		.mount(&server)
		.await;
	server
}

async fn received_payloads(server: &MockServer) -> Vec<Value> {
	server
		.received_requests()
		.await
		.unwrap_or_default()
		.iter()
		.map(|request| serde_json::from_slice(&request.body).expect("JSON payload"))
		.collect()
}

async fn wait_for_payloads<F>(server: &MockServer, predicate: F) -> Vec<Value>
where
	F: Fn(&[Value]) -> bool,
{
	for _ in 0..200 {
		let payloads = received_payloads(server).await;
		if predicate(&payloads) {
			return payloads;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	received_payloads(server).await
}

fn of_type<'a>(payloads: &'a [Value], event_type: &str) -> Vec<&'a Value> {
	payloads
		.iter()
		.filter(|payload| payload["type"] == event_type)
		.collect()
}

fn config(server: &MockServer) -> EmbedConfig {
	EmbedConfig::new(
		WebsiteId::new("abc123").unwrap(),
		Url::parse(&server.uri()).unwrap(),
	)
}

#[tokio::test]
async fn click_produces_one_payload_with_assigned_target() {
	let server = collection_endpoint().await;
	let page = FakePage::new();
	let button = FakeElement::new("button", &[]);
	page.add_element(button.clone());

	let clock = Arc::new(ManualClock::new());
	let _agent = Agent::mount_with_clock(
		config(&server),
		page.clone(),
		Arc::new(MemoryStore::new()),
		Arc::new(NoBeacon),
		clock,
	)
	.await;

	// Mount delivers the initial page view.
	let payloads = wait_for_payloads(&server, |p| !of_type(p, "page_view").is_empty()).await;
	assert_eq!(of_type(&payloads, "page_view").len(), 1);

	let assigned = button.attr("data-arunya-id").expect("id assigned by scan");
	button.click();

	let payloads = wait_for_payloads(&server, |p| !of_type(p, "click").is_empty()).await;
	let clicks = of_type(&payloads, "click");
	assert_eq!(clicks.len(), 1);
	assert_eq!(clicks[0]["target"], assigned);
	assert_eq!(clicks[0]["websiteId"], "abc123");
	assert_eq!(clicks[0]["url"]["hostname"], "example.com");
	assert!(clicks[0]["sessionId"].is_string());
}

#[tokio::test]
async fn custom_event_extracts_reserved_attributes() {
	let server = collection_endpoint().await;
	let page = FakePage::new();
	let signup = FakeElement::new(
		"button",
		&[
			("data-arunya-event", "signup"),
			("data-arunya-plan", r#"{"tier":"pro"}"#),
		],
	);
	page.add_element(signup.clone());

	let _agent = Agent::mount_with_clock(
		config(&server),
		page,
		Arc::new(MemoryStore::new()),
		Arc::new(NoBeacon),
		Arc::new(ManualClock::new()),
	)
	.await;

	signup.click();

	let payloads =
		wait_for_payloads(&server, |p| !of_type(p, "custom_event").is_empty()).await;
	let events = of_type(&payloads, "custom_event");
	assert_eq!(events.len(), 1);
	assert_eq!(events[0]["name"], "signup");
	assert_eq!(events[0]["data"]["plan"]["tier"], "pro");
	assert!(events[0]["data"].get("event").is_none());
	assert!(events[0]["data"].get("id").is_none());
}

#[tokio::test]
async fn renewal_threads_previous_session_into_payloads() {
	let server = collection_endpoint().await;
	let page = FakePage::new();
	let button = FakeElement::new("button", &[]);
	page.add_element(button.clone());

	let clock = Arc::new(ManualClock::new());
	let _agent = Agent::mount_with_clock(
		config(&server)
			.with_expiry_check_interval(Duration::from_millis(20)),
		page,
		Arc::new(MemoryStore::new()),
		Arc::new(NoBeacon),
		clock.clone(),
	)
	.await;

	let payloads = wait_for_payloads(&server, |p| !of_type(p, "page_view").is_empty()).await;
	let first_session = of_type(&payloads, "page_view")[0]["sessionId"]
		.as_str()
		.unwrap()
		.to_string();

	// Idle past the timeout; the periodic check renews the session.
	clock.advance(Duration::from_secs(31 * 60));
	tokio::time::sleep(Duration::from_millis(100)).await;

	button.click();

	let payloads = wait_for_payloads(&server, |p| !of_type(p, "click").is_empty()).await;
	let click = of_type(&payloads, "click")[0];

	let new_session = click["sessionId"].as_str().unwrap();
	assert_ne!(new_session, first_session);

	let previous: Vec<&str> = click["previousSessions"]
		.as_array()
		.unwrap()
		.iter()
		.map(|id| id.as_str().unwrap())
		.collect();
	assert_eq!(previous, vec![first_session.as_str()]);
}

#[tokio::test]
async fn spa_navigation_delivers_second_page_view() {
	let server = collection_endpoint().await;
	let page = FakePage::new();

	let clock = Arc::new(ManualClock::new());
	let _agent = Agent::mount_with_clock(
		config(&server),
		page.clone(),
		Arc::new(MemoryStore::new()),
		Arc::new(NoBeacon),
		clock.clone(),
	)
	.await;

	wait_for_payloads(&server, |p| !of_type(p, "page_view").is_empty()).await;

	// Step past the page_view throttle window before navigating.
	clock.advance(Duration::from_millis(600));
	page.navigate("/pricing", "", "Pricing");

	let payloads =
		wait_for_payloads(&server, |p| of_type(p, "page_view").len() >= 2).await;
	let views = of_type(&payloads, "page_view");
	assert_eq!(views.len(), 2);
	assert_eq!(views[1]["title"], "Pricing");
	assert_eq!(views[1]["url"]["path"], "/pricing");
}
