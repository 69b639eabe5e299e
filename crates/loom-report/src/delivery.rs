// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Transport seam for sending payloads to the collector.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use loom_report_core::{EventPayload, SessionPayload};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;

/// Version sent with event payloads.
pub const EVENT_PAYLOAD_VERSION: &str = "4.0";
/// Version sent with session payloads.
pub const SESSION_PAYLOAD_VERSION: &str = "1.0";

pub const HEADER_API_KEY: &str = "Loom-Api-Key";
pub const HEADER_PAYLOAD_VERSION: &str = "Loom-Payload-Version";
pub const HEADER_SENT_AT: &str = "Loom-Sent-At";

/// The result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
	/// Accepted by the collector.
	Delivered,
	/// Transient failure; keep the payload and try again later.
	Undelivered,
	/// Permanent failure; the payload will never be accepted.
	Failure,
}

impl std::fmt::Display for DeliveryStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Delivered => write!(f, "delivered"),
			Self::Undelivered => write!(f, "undelivered"),
			Self::Failure => write!(f, "failure"),
		}
	}
}

/// Where and how to send a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryParams {
	pub endpoint: String,
	pub headers: BTreeMap<String, String>,
}

impl DeliveryParams {
	pub fn for_events(endpoint: impl Into<String>, api_key: &str) -> Self {
		Self::new(endpoint, api_key, EVENT_PAYLOAD_VERSION)
	}

	pub fn for_sessions(endpoint: impl Into<String>, api_key: &str) -> Self {
		Self::new(endpoint, api_key, SESSION_PAYLOAD_VERSION)
	}

	fn new(endpoint: impl Into<String>, api_key: &str, version: &str) -> Self {
		let mut headers = BTreeMap::new();
		headers.insert(HEADER_API_KEY.to_string(), api_key.to_string());
		headers.insert(HEADER_PAYLOAD_VERSION.to_string(), version.to_string());
		Self {
			endpoint: endpoint.into(),
			headers,
		}
	}
}

/// Sends payloads to the collector.
///
/// Implementations are called from background workers and must classify every
/// problem as a [`DeliveryStatus`]; they should not panic, though a panic is
/// caught and treated as [`DeliveryStatus::Undelivered`].
#[async_trait]
pub trait Delivery: Send + Sync {
	async fn deliver_event(&self, payload: &EventPayload, params: &DeliveryParams) -> DeliveryStatus;

	async fn deliver_session(
		&self,
		payload: &SessionPayload,
		params: &DeliveryParams,
	) -> DeliveryStatus;
}

/// [`Delivery`] over HTTPS with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
	client: Client,
}

impl HttpDelivery {
	pub fn new(timeout: Duration) -> Result<Self> {
		let client = Client::builder()
			.timeout(timeout)
			.user_agent(concat!("loom-report/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self { client })
	}

	pub fn with_client(client: Client) -> Self {
		Self { client }
	}

	async fn post<T: Serialize + Sync>(&self, body: &T, params: &DeliveryParams) -> DeliveryStatus {
		let mut request = self
			.client
			.post(&params.endpoint)
			.header(HEADER_SENT_AT, Utc::now().to_rfc3339())
			.json(body);
		for (name, value) in &params.headers {
			request = request.header(name.as_str(), value.as_str());
		}

		match request.send().await {
			Ok(response) => {
				let status = status_for(response.status());
				debug!(endpoint = %params.endpoint, http_status = response.status().as_u16(), outcome = %status, "Payload sent");
				status
			}
			Err(e) => {
				warn!(endpoint = %params.endpoint, error = %e, "Delivery request failed");
				DeliveryStatus::Undelivered
			}
		}
	}
}

#[async_trait]
impl Delivery for HttpDelivery {
	async fn deliver_event(&self, payload: &EventPayload, params: &DeliveryParams) -> DeliveryStatus {
		self.post(payload, params).await
	}

	async fn deliver_session(
		&self,
		payload: &SessionPayload,
		params: &DeliveryParams,
	) -> DeliveryStatus {
		self.post(payload, params).await
	}
}

/// Maps a collector response code to an outcome. 408 and 429 are transient
/// client errors; every other 4xx is permanent.
pub fn status_for(code: StatusCode) -> DeliveryStatus {
	if code.is_success() {
		DeliveryStatus::Delivered
	} else if code.is_client_error()
		&& code != StatusCode::REQUEST_TIMEOUT
		&& code != StatusCode::TOO_MANY_REQUESTS
	{
		DeliveryStatus::Failure
	} else {
		DeliveryStatus::Undelivered
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_report_core::{AppState, DeviceState, Notifier};
	use wiremock::matchers::{header, header_exists, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const KEY: &str = "0123456789abcdef0123456789abcdef";

	#[test]
	fn test_status_mapping() {
		for code in [200, 202, 204] {
			assert_eq!(status_for(StatusCode::from_u16(code).unwrap()), DeliveryStatus::Delivered);
		}
		for code in [400, 401, 403, 404, 413, 422] {
			assert_eq!(
				status_for(StatusCode::from_u16(code).unwrap()),
				DeliveryStatus::Failure,
				"status {code} should be permanent"
			);
		}
		for code in [408, 429, 500, 502, 503, 504, 301] {
			assert_eq!(
				status_for(StatusCode::from_u16(code).unwrap()),
				DeliveryStatus::Undelivered,
				"status {code} should be retried"
			);
		}
	}

	fn session_payload() -> SessionPayload {
		SessionPayload {
			notifier: Notifier::default(),
			app: AppState::default(),
			device: DeviceState::default(),
			sessions: Vec::new(),
		}
	}

	#[tokio::test]
	async fn test_sends_headers_and_maps_success() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/sessions"))
			.and(header(HEADER_API_KEY, KEY))
			.and(header(HEADER_PAYLOAD_VERSION, SESSION_PAYLOAD_VERSION))
			.and(header_exists(HEADER_SENT_AT))
			.respond_with(ResponseTemplate::new(202))
			.expect(1)
			.mount(&server)
			.await;

		let delivery = HttpDelivery::new(Duration::from_secs(5)).unwrap();
		let params = DeliveryParams::for_sessions(format!("{}/sessions", server.uri()), KEY);

		let status = delivery.deliver_session(&session_payload(), &params).await;
		assert_eq!(status, DeliveryStatus::Delivered);
	}

	#[tokio::test]
	async fn test_rejected_payload_is_failure() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(400))
			.mount(&server)
			.await;

		let delivery = HttpDelivery::new(Duration::from_secs(5)).unwrap();
		let params = DeliveryParams::for_sessions(server.uri(), KEY);

		let status = delivery.deliver_session(&session_payload(), &params).await;
		assert_eq!(status, DeliveryStatus::Failure);
	}

	#[tokio::test]
	async fn test_unreachable_collector_is_undelivered() {
		let delivery = HttpDelivery::new(Duration::from_millis(500)).unwrap();
		let params = DeliveryParams::for_sessions("http://127.0.0.1:9/sessions", KEY);

		let status = delivery.deliver_session(&session_payload(), &params).await;
		assert_eq!(status, DeliveryStatus::Undelivered);
	}
}
