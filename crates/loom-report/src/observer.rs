// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fan-out of client state changes to external listeners.
//!
//! Two ways to listen: register a synchronous observer, called inline on the
//! notifying thread, or subscribe to a broadcast channel. Neither applies
//! backpressure. Slow channel subscribers lag and lose messages, and a
//! panicking observer is logged and skipped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use loom_report_core::{Breadcrumb, PayloadKind, SessionId};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::warn;

use crate::delivery::DeliveryStatus;

const CHANNEL_CAPACITY: usize = 256;

/// A state change worth telling the outside world about.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
	SessionStarted {
		id: SessionId,
		started_at: DateTime<Utc>,
		handled: u32,
		unhandled: u32,
	},
	/// The current session was paused, or a rehydrated descriptor said there
	/// is no session.
	SessionPaused,
	ForegroundChanged {
		in_foreground: bool,
		/// Most recently foregrounded activity that is still foregrounded.
		context_activity: Option<String>,
	},
	BreadcrumbAdded(Breadcrumb),
	DeliveryOutcome {
		kind: PayloadKind,
		status: DeliveryStatus,
	},
}

/// Handle for removing a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(&StateEvent) + Send + Sync>;

pub struct ObserverBus {
	observers: RwLock<Vec<(ObserverId, Observer)>>,
	next_id: AtomicU64,
	sender: broadcast::Sender<StateEvent>,
}

impl ObserverBus {
	pub fn new() -> Self {
		let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
		Self {
			observers: RwLock::new(Vec::new()),
			next_id: AtomicU64::new(1),
			sender,
		}
	}

	pub fn register<F>(&self, observer: F) -> ObserverId
	where
		F: Fn(&StateEvent) + Send + Sync + 'static,
	{
		let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
		self.observers.write().push((id, Arc::new(observer)));
		id
	}

	/// Returns false if the observer was not registered.
	pub fn unregister(&self, id: ObserverId) -> bool {
		let mut observers = self.observers.write();
		let before = observers.len();
		observers.retain(|(existing, _)| *existing != id);
		observers.len() != before
	}

	pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
		self.sender.subscribe()
	}

	pub fn observer_count(&self) -> usize {
		self.observers.read().len()
	}

	/// Delivers `event` to every observer, then to channel subscribers.
	pub fn notify(&self, event: StateEvent) {
		let observers: Vec<Observer> = self
			.observers
			.read()
			.iter()
			.map(|(_, observer)| Arc::clone(observer))
			.collect();

		for observer in observers {
			if catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
				warn!("State observer panicked; continuing");
			}
		}

		// No subscribers is fine.
		let _ = self.sender.send(event);
	}
}

impl Default for ObserverBus {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for ObserverBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ObserverBus")
			.field("observers", &self.observer_count())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;

	#[test]
	fn test_observers_receive_events_in_registration_order() {
		let bus = ObserverBus::new();
		let seen = Arc::new(Mutex::new(Vec::new()));

		for tag in ["a", "b"] {
			let seen = Arc::clone(&seen);
			bus.register(move |_| seen.lock().push(tag));
		}

		bus.notify(StateEvent::SessionPaused);
		assert_eq!(*seen.lock(), vec!["a", "b"]);
	}

	#[test]
	fn test_unregister_stops_delivery() {
		let bus = ObserverBus::new();
		let count = Arc::new(AtomicU64::new(0));
		let counter = Arc::clone(&count);
		let id = bus.register(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		bus.notify(StateEvent::SessionPaused);
		assert!(bus.unregister(id));
		assert!(!bus.unregister(id));
		bus.notify(StateEvent::SessionPaused);

		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_panicking_observer_does_not_block_others() {
		let bus = ObserverBus::new();
		let reached = Arc::new(AtomicU64::new(0));
		bus.register(|_| panic!("observer bug"));
		let counter = Arc::clone(&reached);
		bus.register(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		bus.notify(StateEvent::SessionPaused);
		assert_eq!(reached.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_subscriber_receives_event() {
		let bus = ObserverBus::new();
		let mut rx = bus.subscribe();

		bus.notify(StateEvent::ForegroundChanged {
			in_foreground: true,
			context_activity: Some("MainActivity".to_string()),
		});

		let event = rx.recv().await.unwrap();
		assert_eq!(
			event,
			StateEvent::ForegroundChanged {
				in_foreground: true,
				context_activity: Some("MainActivity".to_string()),
			}
		);
	}

	#[test]
	fn test_notify_without_subscribers_is_fine() {
		let bus = ObserverBus::new();
		bus.notify(StateEvent::SessionPaused);
	}
}
