// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session types for app session tracking.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::User;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for SessionId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Handled and unhandled error counts for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
	pub handled: u32,
	pub unhandled: u32,
}

/// A live session: one period of app usage that error counts aggregate into.
///
/// The counters sit behind one lock so that an increment and the copy taken for
/// reporting are a single step; a snapshot never observes half an update.
#[derive(Debug)]
pub struct Session {
	id: SessionId,
	started_at: DateTime<Utc>,
	user: Option<User>,
	auto_captured: bool,
	paused: AtomicBool,
	tracked: AtomicBool,
	counts: Mutex<EventCounts>,
}

impl Session {
	/// A fresh session with zeroed counters.
	pub fn new(
		id: SessionId,
		started_at: DateTime<Utc>,
		user: Option<User>,
		auto_captured: bool,
	) -> Self {
		Self {
			id,
			started_at,
			user,
			auto_captured,
			paused: AtomicBool::new(false),
			tracked: AtomicBool::new(false),
			counts: Mutex::new(EventCounts::default()),
		}
	}

	/// A session restored from a descriptor observed elsewhere (for example a
	/// native layer). Restored sessions have already been reported, so they
	/// start out tracked.
	pub fn restored(
		id: SessionId,
		started_at: DateTime<Utc>,
		user: Option<User>,
		unhandled: u32,
		handled: u32,
	) -> Self {
		Self {
			id,
			started_at,
			user,
			auto_captured: false,
			paused: AtomicBool::new(false),
			tracked: AtomicBool::new(true),
			counts: Mutex::new(EventCounts { handled, unhandled }),
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn started_at(&self) -> DateTime<Utc> {
		self.started_at
	}

	pub fn user(&self) -> Option<&User> {
		self.user.as_ref()
	}

	pub fn is_auto_captured(&self) -> bool {
		self.auto_captured
	}

	pub fn is_paused(&self) -> bool {
		self.paused.load(Ordering::SeqCst)
	}

	/// Marks the session paused. Returns false if it already was.
	pub fn pause(&self) -> bool {
		!self.paused.swap(true, Ordering::SeqCst)
	}

	/// Clears the paused flag. Returns true only on a paused → active change.
	pub fn resume(&self) -> bool {
		self
			.paused
			.compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
			.is_ok()
	}

	pub fn is_tracked(&self) -> bool {
		self.tracked.load(Ordering::SeqCst)
	}

	/// Flips the tracked flag. Only the first caller gets `true`, so a
	/// session is delivered at most once.
	pub fn mark_tracked(&self) -> bool {
		self
			.tracked
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_ok()
	}

	pub fn counts(&self) -> EventCounts {
		*self.counts.lock()
	}

	pub fn increment_handled_and_copy(&self) -> SessionSnapshot {
		let mut counts = self.counts.lock();
		counts.handled = counts.handled.saturating_add(1);
		self.snapshot_with(*counts)
	}

	pub fn increment_unhandled_and_copy(&self) -> SessionSnapshot {
		let mut counts = self.counts.lock();
		counts.unhandled = counts.unhandled.saturating_add(1);
		self.snapshot_with(*counts)
	}

	/// Point-in-time copy for reporting.
	pub fn snapshot(&self) -> SessionSnapshot {
		let counts = *self.counts.lock();
		self.snapshot_with(counts)
	}

	fn snapshot_with(&self, events: EventCounts) -> SessionSnapshot {
		SessionSnapshot {
			id: self.id,
			started_at: self.started_at,
			user: self.user.clone(),
			events,
		}
	}
}

/// Immutable copy of a session, as attached to events and delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
	pub id: SessionId,
	pub started_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<User>,
	pub events: EventCounts,
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::sync::Arc;

	proptest! {
		#[test]
		fn session_id_roundtrip(uuid_bytes in any::<[u8; 16]>()) {
			let id = SessionId(Uuid::from_bytes(uuid_bytes));
			let parsed: SessionId = id.to_string().parse().unwrap();
			prop_assert_eq!(id, parsed);
		}
	}

	fn session() -> Session {
		Session::new(SessionId::new(), Utc::now(), None, false)
	}

	#[test]
	fn test_increment_and_copy_reflects_increment() {
		let session = session();
		let first = session.increment_handled_and_copy();
		let second = session.increment_unhandled_and_copy();

		assert_eq!(first.events, EventCounts { handled: 1, unhandled: 0 });
		assert_eq!(second.events, EventCounts { handled: 1, unhandled: 1 });
		assert_eq!(session.counts(), second.events);
	}

	#[test]
	fn test_concurrent_increments_are_not_lost() {
		let session = Arc::new(session());
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let session = Arc::clone(&session);
				std::thread::spawn(move || {
					for _ in 0..250 {
						session.increment_handled_and_copy();
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}

		assert_eq!(session.counts().handled, 2000);
	}

	#[test]
	fn test_resume_only_reports_paused_to_active() {
		let session = session();
		assert!(!session.resume());
		assert!(session.pause());
		assert!(!session.pause());
		assert!(session.resume());
		assert!(!session.is_paused());
	}

	#[test]
	fn test_mark_tracked_succeeds_once() {
		let session = session();
		assert!(session.mark_tracked());
		assert!(!session.mark_tracked());
		assert!(session.is_tracked());
	}

	#[test]
	fn test_restored_session_keeps_counts_and_is_tracked() {
		let id = SessionId::new();
		let session = Session::restored(id, Utc::now(), None, 2, 5);
		assert_eq!(session.id(), id);
		assert_eq!(session.counts(), EventCounts { handled: 5, unhandled: 2 });
		assert!(session.is_tracked());
		assert!(!session.is_auto_captured());
	}
}
