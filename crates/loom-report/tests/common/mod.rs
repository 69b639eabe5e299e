// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared helpers for loom-report integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use loom_report::{
	Clock, Delivery, DeliveryParams, DeliveryStatus, Event, EventPayload, ManualClock, ReportClient,
	ReportClientBuilder, SessionPayload, SessionSnapshot,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};

pub const API_KEY: &str = "0123456789abcdef0123456789abcdef";

static TRACING: Once = Once::new();

/// Routes client logs through the test harness so they show up on failure.
pub fn init_tracing() {
	TRACING.call_once(|| {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(
				tracing_subscriber::EnvFilter::try_from_default_env()
					.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("loom_report=debug")),
			)
			.with_test_writer()
			.try_init();
	});
}

/// A delivery that answers from a script, then with `fallback`, and records
/// everything it was asked to send.
pub struct MockDelivery {
	script: Mutex<VecDeque<DeliveryStatus>>,
	fallback: DeliveryStatus,
	event_calls: AtomicUsize,
	session_calls: AtomicUsize,
	events: Mutex<Vec<Event>>,
	sessions: Mutex<Vec<SessionSnapshot>>,
	gate: Option<Gate>,
}

/// Holds event deliveries until released.
pub struct Gate {
	permits: Arc<Semaphore>,
	entered: Arc<Notify>,
}

impl MockDelivery {
	pub fn new(script: &[DeliveryStatus], fallback: DeliveryStatus) -> Self {
		Self {
			script: Mutex::new(script.iter().copied().collect()),
			fallback,
			event_calls: AtomicUsize::new(0),
			session_calls: AtomicUsize::new(0),
			events: Mutex::new(Vec::new()),
			sessions: Mutex::new(Vec::new()),
			gate: None,
		}
	}

	pub fn delivering() -> Self {
		Self::new(&[], DeliveryStatus::Delivered)
	}

	/// Event deliveries block until [`MockDelivery::release`] is called.
	pub fn gated(mut self) -> Self {
		self.gate = Some(Gate {
			permits: Arc::new(Semaphore::new(0)),
			entered: Arc::new(Notify::new()),
		});
		self
	}

	/// Resolves once an event delivery is waiting at the gate.
	pub async fn wait_entered(&self) {
		if let Some(gate) = &self.gate {
			gate.entered.notified().await;
		}
	}

	pub fn release(&self) {
		if let Some(gate) = &self.gate {
			gate.permits.add_permits(Semaphore::MAX_PERMITS / 2);
		}
	}

	pub fn event_calls(&self) -> usize {
		self.event_calls.load(Ordering::SeqCst)
	}

	pub fn session_calls(&self) -> usize {
		self.session_calls.load(Ordering::SeqCst)
	}

	/// Events from every request, whatever the outcome.
	pub fn events(&self) -> Vec<Event> {
		self.events.lock().clone()
	}

	pub fn sessions(&self) -> Vec<SessionSnapshot> {
		self.sessions.lock().clone()
	}

	fn next(&self) -> DeliveryStatus {
		self.script.lock().pop_front().unwrap_or(self.fallback)
	}
}

#[async_trait]
impl Delivery for MockDelivery {
	async fn deliver_event(&self, payload: &EventPayload, _: &DeliveryParams) -> DeliveryStatus {
		self.event_calls.fetch_add(1, Ordering::SeqCst);
		if let Some(gate) = &self.gate {
			gate.entered.notify_one();
			let _permit = gate.permits.acquire().await.unwrap();
		}
		self.events.lock().extend(payload.events.iter().cloned());
		self.next()
	}

	async fn deliver_session(&self, payload: &SessionPayload, _: &DeliveryParams) -> DeliveryStatus {
		self.session_calls.fetch_add(1, Ordering::SeqCst);
		self.sessions.lock().extend(payload.sessions.iter().cloned());
		self.next()
	}
}

pub struct Harness {
	pub client: ReportClient,
	pub delivery: Arc<MockDelivery>,
	pub clock: Arc<ManualClock>,
	pub dir: TempDir,
}

/// A builder wired to `delivery`, a manual clock and a fresh storage dir,
/// running on the current tokio runtime.
pub fn builder(delivery: &Arc<MockDelivery>) -> (ReportClientBuilder, Arc<ManualClock>, TempDir) {
	init_tracing();
	let dir = TempDir::new().unwrap();
	let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()));
	let builder = ReportClient::builder()
		.api_key(API_KEY)
		.storage_dir(dir.path())
		.delivery(delivery.clone())
		.clock(clock.clone() as Arc<dyn Clock>)
		.runtime_handle(Handle::current());
	(builder, clock, dir)
}

/// Builds a client and waits out the launch flushes so tests start idle.
pub async fn start(delivery: MockDelivery) -> Harness {
	let delivery = Arc::new(delivery);
	let (builder, clock, dir) = builder(&delivery);
	let client = builder.build().unwrap();
	client.drain().await;
	Harness {
		client,
		delivery,
		clock,
		dir,
	}
}
