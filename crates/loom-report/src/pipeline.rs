// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of fresh payloads and retry of stored ones.
//!
//! Outcome handling:
//!
//! | outcome       | fresh payload        | stored record(s)        |
//! |---------------|----------------------|-------------------------|
//! | `Delivered`   | done                 | deleted                 |
//! | `Undelivered` | written to the store | claim released, kept    |
//! | `Failure`     | dropped              | deleted                 |
//!
//! Each store has its own single-flight gate. A flush that finds the gate held
//! returns [`FlushOutcome::Skipped`] straight away; whatever it would have sent
//! is picked up by the flush already running or by the next one.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::slice;
use std::sync::Arc;

use futures::FutureExt;
use loom_report_core::{Event, EventPayload, Notifier, PayloadKind, SessionPayload, SessionSnapshot};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::delivery::{Delivery, DeliveryParams, DeliveryStatus};
use crate::error::Result;
use crate::observer::{ObserverBus, StateEvent};
use crate::snapshot::{AppSnapshot, DeviceSnapshot};
use crate::store::{FileStore, StoredRecord};

/// Counts from one completed flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
	pub delivered: usize,
	/// Left in the store for a later flush.
	pub retained: usize,
	/// Deleted without being delivered (permanent failure or unreadable).
	pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
	/// Another flush of the same store was already running.
	Skipped,
	Completed(FlushSummary),
}

/// Settings the pipeline needs to address the collector.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
	pub api_key: String,
	pub notifier: Notifier,
	pub event_params: DeliveryParams,
	pub session_params: DeliveryParams,
	pub max_persisted_events: usize,
	pub max_persisted_sessions: usize,
}

pub struct DeliveryPipeline {
	settings: PipelineSettings,
	delivery: Arc<dyn Delivery>,
	events: FileStore<Event>,
	sessions: FileStore<SessionSnapshot>,
	app: Arc<dyn AppSnapshot>,
	device: Arc<dyn DeviceSnapshot>,
	observers: Arc<ObserverBus>,
	event_flush: Semaphore,
	session_flush: Semaphore,
}

impl DeliveryPipeline {
	/// Opens the event and session stores under `storage_dir`.
	pub fn open(
		storage_dir: &Path,
		settings: PipelineSettings,
		delivery: Arc<dyn Delivery>,
		app: Arc<dyn AppSnapshot>,
		device: Arc<dyn DeviceSnapshot>,
		observers: Arc<ObserverBus>,
	) -> Result<Self> {
		let events = FileStore::open(
			storage_dir.join("events"),
			PayloadKind::Event,
			settings.max_persisted_events,
		)?;
		let sessions = FileStore::open(
			storage_dir.join("sessions"),
			PayloadKind::Session,
			settings.max_persisted_sessions,
		)?;

		Ok(Self {
			settings,
			delivery,
			events,
			sessions,
			app,
			device,
			observers,
			event_flush: Semaphore::new(1),
			session_flush: Semaphore::new(1),
		})
	}

	pub fn event_store(&self) -> &FileStore<Event> {
		&self.events
	}

	pub fn session_store(&self) -> &FileStore<SessionSnapshot> {
		&self.sessions
	}

	pub fn settings(&self) -> &PipelineSettings {
		&self.settings
	}

	/// Attempts a fresh event. Stores it on a transient failure.
	pub async fn deliver_event(&self, event: Event) -> DeliveryStatus {
		let payload = EventPayload::new(&self.settings.api_key, self.settings.notifier.clone(), event);
		let status = self.send_event(&payload).await;

		match status {
			DeliveryStatus::Delivered => {
				info!("Event delivered");
				self.flush_stored_events().await;
			}
			DeliveryStatus::Undelivered => {
				for event in &payload.events {
					self.persist_event(event);
				}
			}
			DeliveryStatus::Failure => {
				warn!("Event rejected by collector; dropping");
			}
		}
		status
	}

	/// Writes an event to the store. Storage errors are logged and the event
	/// is lost.
	pub fn persist_event(&self, event: &Event) -> Option<StoredRecord> {
		match self.events.write(event) {
			Ok(record) => {
				info!(record = %record.name(), "Event stored for later delivery");
				Some(record)
			}
			Err(e) => {
				error!(error = %e, "Failed to store event; dropping");
				None
			}
		}
	}

	/// Retries stored events oldest first, one request per record. Stops at
	/// the first transient failure and leaves the rest in the store.
	pub async fn flush_stored_events(&self) -> FlushOutcome {
		let Ok(_permit) = self.event_flush.try_acquire() else {
			debug!("Event flush already running; skipping");
			return FlushOutcome::Skipped;
		};

		let records = match self.events.claim() {
			Ok(records) => records,
			Err(e) => {
				error!(error = %e, "Failed to enumerate stored events");
				return FlushOutcome::Completed(FlushSummary::default());
			}
		};
		if !records.is_empty() {
			debug!(count = records.len(), "Flushing stored events");
		}

		let mut summary = FlushSummary::default();
		for (index, record) in records.iter().enumerate() {
			let event = match self.events.read(record) {
				Ok(event) => event,
				Err(e) => {
					warn!(record = %record.name(), error = %e, "Deleting unreadable stored event");
					self.events.delete(slice::from_ref(record));
					summary.dropped += 1;
					continue;
				}
			};

			let payload = EventPayload::new(&self.settings.api_key, self.settings.notifier.clone(), event);
			match self.send_event(&payload).await {
				DeliveryStatus::Delivered => {
					self.events.delete(slice::from_ref(record));
					summary.delivered += 1;
				}
				DeliveryStatus::Failure => {
					warn!(record = %record.name(), "Stored event rejected by collector; deleting");
					self.events.delete(slice::from_ref(record));
					summary.dropped += 1;
				}
				DeliveryStatus::Undelivered => {
					let remaining = &records[index..];
					self.events.cancel(remaining);
					summary.retained += remaining.len();
					break;
				}
			}
		}

		if summary != FlushSummary::default() {
			info!(
				delivered = summary.delivered,
				retained = summary.retained,
				dropped = summary.dropped,
				"Stored event flush complete"
			);
		}
		FlushOutcome::Completed(summary)
	}

	/// Attempts a fresh session payload, flushing stored sessions first.
	pub async fn deliver_session(&self, payload: SessionPayload) -> DeliveryStatus {
		self.flush_stored_sessions().await;

		let status = self.send_session(&payload).await;
		match status {
			DeliveryStatus::Delivered => {
				debug!(count = payload.sessions.len(), "Session delivered");
			}
			DeliveryStatus::Undelivered => {
				self.persist_sessions(&payload.sessions);
			}
			DeliveryStatus::Failure => {
				warn!("Session rejected by collector; dropping");
			}
		}
		status
	}

	pub fn persist_sessions(&self, sessions: &[SessionSnapshot]) -> usize {
		let mut stored = 0;
		for session in sessions {
			match self.sessions.write(session) {
				Ok(record) => {
					debug!(session_id = %session.id, record = %record.name(), "Session stored for later delivery");
					stored += 1;
				}
				Err(e) => {
					error!(session_id = %session.id, error = %e, "Failed to store session; dropping");
				}
			}
		}
		stored
	}

	/// Retries all stored sessions as a single batch.
	pub async fn flush_stored_sessions(&self) -> FlushOutcome {
		let Ok(_permit) = self.session_flush.try_acquire() else {
			debug!("Session flush already running; skipping");
			return FlushOutcome::Skipped;
		};

		let records = match self.sessions.claim() {
			Ok(records) => records,
			Err(e) => {
				error!(error = %e, "Failed to enumerate stored sessions");
				return FlushOutcome::Completed(FlushSummary::default());
			}
		};

		let mut summary = FlushSummary::default();
		let mut readable = Vec::with_capacity(records.len());
		let mut sessions = Vec::with_capacity(records.len());
		for record in records {
			match self.sessions.read(&record) {
				Ok(session) => {
					sessions.push(session);
					readable.push(record);
				}
				Err(e) => {
					warn!(record = %record.name(), error = %e, "Deleting unreadable stored session");
					self.sessions.delete(slice::from_ref(&record));
					summary.dropped += 1;
				}
			}
		}
		if sessions.is_empty() {
			return FlushOutcome::Completed(summary);
		}

		debug!(count = sessions.len(), "Flushing stored sessions");
		let payload = SessionPayload {
			notifier: self.settings.notifier.clone(),
			app: self.app.current_app(),
			device: self.device.current_device(),
			sessions,
		};

		match self.send_session(&payload).await {
			DeliveryStatus::Delivered => {
				self.sessions.delete(&readable);
				summary.delivered += readable.len();
			}
			DeliveryStatus::Failure => {
				warn!(count = readable.len(), "Stored sessions rejected by collector; deleting");
				self.sessions.delete(&readable);
				summary.dropped += readable.len();
			}
			DeliveryStatus::Undelivered => {
				self.sessions.cancel(&readable);
				summary.retained += readable.len();
			}
		}
		FlushOutcome::Completed(summary)
	}

	async fn send_event(&self, payload: &EventPayload) -> DeliveryStatus {
		let status = AssertUnwindSafe(
			self
				.delivery
				.deliver_event(payload, &self.settings.event_params),
		)
		.catch_unwind()
		.await
		.unwrap_or_else(|_| {
			warn!("Event delivery panicked; treating as undelivered");
			DeliveryStatus::Undelivered
		});
		self.observers.notify(StateEvent::DeliveryOutcome {
			kind: PayloadKind::Event,
			status,
		});
		status
	}

	async fn send_session(&self, payload: &SessionPayload) -> DeliveryStatus {
		let status = AssertUnwindSafe(
			self
				.delivery
				.deliver_session(payload, &self.settings.session_params),
		)
		.catch_unwind()
		.await
		.unwrap_or_else(|_| {
			warn!("Session delivery panicked; treating as undelivered");
			DeliveryStatus::Undelivered
		});
		self.observers.notify(StateEvent::DeliveryOutcome {
			kind: PayloadKind::Session,
			status,
		});
		status
	}
}

impl std::fmt::Debug for DeliveryPipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeliveryPipeline")
			.field("events", &self.events)
			.field("sessions", &self.sessions)
			.finish()
	}
}
