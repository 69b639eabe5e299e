// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client tests against a real HTTP collector.

mod common;

use std::io;
use std::time::Duration;

use loom_report::delivery::{EVENT_PAYLOAD_VERSION, HEADER_API_KEY, HEADER_PAYLOAD_VERSION};
use loom_report::ReportClient;
use tempfile::TempDir;
use tokio::runtime::Handle;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{init_tracing, API_KEY};

fn client(server: &MockServer, dir: &TempDir) -> ReportClient {
	init_tracing();
	ReportClient::builder()
		.api_key(API_KEY)
		.storage_dir(dir.path())
		.endpoints(format!("{}/notify", server.uri()), format!("{}/sessions", server.uri()))
		.request_timeout(Duration::from_secs(5))
		.runtime_handle(Handle::current())
		.build()
		.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_event_is_posted_with_headers() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/notify"))
		.and(header(HEADER_API_KEY, API_KEY))
		.and(header(HEADER_PAYLOAD_VERSION, EVENT_PAYLOAD_VERSION))
		.and(body_partial_json(serde_json::json!({ "apiKey": API_KEY })))
		.respond_with(ResponseTemplate::new(200))
		.expect(1)
		.mount(&server)
		.await;

	let dir = TempDir::new().unwrap();
	let client = client(&server, &dir);
	client.drain().await;

	client.notify(&io::Error::new(io::ErrorKind::Other, "disk full"));
	client.drain().await;

	assert!(client.pipeline().event_store().is_empty());
}

/// Test that events stored during an outage go out once the collector is back.
/// **Why Important**: Offline devices must not lose reports or need a restart
/// to send them.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_error_stores_event_until_connectivity_returns() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/notify"))
		.respond_with(ResponseTemplate::new(503))
		.up_to_n_times(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/notify"))
		.respond_with(ResponseTemplate::new(202))
		.expect(1)
		.mount(&server)
		.await;

	let dir = TempDir::new().unwrap();
	let client = client(&server, &dir);
	client.drain().await;

	client.notify(&io::Error::new(io::ErrorKind::Other, "gateway down"));
	client.drain().await;
	assert_eq!(client.pipeline().event_store().len(), 1);

	client.connectivity_changed(true);
	client.drain().await;
	assert!(client.pipeline().event_store().is_empty());
}
