// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Current-session cell and foreground tracking.
//!
//! The tracker owns the single "current session" slot and decides when a
//! foreground transition should start a session automatically. It never talks
//! to the delivery pipeline: operations that start a session hand the new
//! session back to the caller, which decides whether to deliver it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use loom_report_core::{Session, SessionId, SessionPayload, SessionSnapshot, User};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::callbacks::CallbackState;
use crate::clock::Clock;
use crate::observer::{ObserverBus, StateEvent};

#[derive(Debug, Clone)]
pub struct SessionTrackerConfig {
	pub auto_track_sessions: bool,
	/// Minimum time in the background before a return to the foreground
	/// starts a new session.
	pub session_timeout: Duration,
}

impl Default for SessionTrackerConfig {
	fn default() -> Self {
		Self {
			auto_track_sessions: true,
			session_timeout: Duration::from_secs(30),
		}
	}
}

/// Outcome of [`SessionTracker::resume_session`].
#[derive(Debug, Clone)]
pub enum Resumed {
	/// A paused session became active again.
	Resumed,
	/// The current session was already active.
	AlreadyActive,
	/// There was no session, so a new one was started.
	Started(Arc<Session>),
}

impl Resumed {
	/// False only when a new session had to be started.
	pub fn resumed(&self) -> bool {
		!matches!(self, Self::Started(_))
	}
}

#[derive(Debug, Default)]
struct ForegroundState {
	/// Foregrounded activity names, oldest first. Duplicates are allowed so
	/// two instances of one activity are tracked independently.
	activities: Vec<String>,
	last_exited: Option<DateTime<Utc>>,
	last_entered: Option<DateTime<Utc>>,
}

pub struct SessionTracker {
	config: SessionTrackerConfig,
	clock: Arc<dyn Clock>,
	observers: Arc<ObserverBus>,
	callbacks: Arc<CallbackState>,
	user: RwLock<User>,
	current: RwLock<Option<Arc<Session>>>,
	foreground: Mutex<ForegroundState>,
}

impl SessionTracker {
	pub fn new(
		config: SessionTrackerConfig,
		clock: Arc<dyn Clock>,
		observers: Arc<ObserverBus>,
		callbacks: Arc<CallbackState>,
	) -> Self {
		Self {
			config,
			clock,
			observers,
			callbacks,
			user: RwLock::new(User::default()),
			current: RwLock::new(None),
			foreground: Mutex::new(ForegroundState::default()),
		}
	}

	pub fn config(&self) -> &SessionTrackerConfig {
		&self.config
	}

	pub fn user(&self) -> User {
		self.user.read().clone()
	}

	pub fn set_user(&self, user: User) {
		*self.user.write() = user;
	}

	fn session_user(&self) -> Option<User> {
		let user = self.user.read();
		(!user.is_empty()).then(|| user.clone())
	}

	/// Starts a new session and makes it current, superseding any existing one.
	pub fn start_new_session(
		&self,
		now: DateTime<Utc>,
		user: Option<User>,
		auto_captured: bool,
	) -> Arc<Session> {
		let session = Arc::new(Session::new(SessionId::new(), now, user, auto_captured));
		*self.current.write() = Some(Arc::clone(&session));

		info!(session_id = %session.id(), auto_captured, "Session started");
		self.notify_started(&session);
		session
	}

	/// Starts a session for the current user at the clock's time.
	pub fn start_session(&self, auto_captured: bool) -> Arc<Session> {
		self.start_new_session(self.clock.now(), self.session_user(), auto_captured)
	}

	/// Pauses the current session. No-op without one.
	pub fn pause_session(&self) {
		let session = self.current.read().clone();
		if let Some(session) = session {
			if session.pause() {
				debug!(session_id = %session.id(), "Session paused");
			}
			self.observers.notify(StateEvent::SessionPaused);
		}
	}

	pub fn resume_session(&self) -> Resumed {
		let session = self.current.read().clone();
		match session {
			None => Resumed::Started(self.start_session(false)),
			Some(session) => {
				if session.resume() {
					debug!(session_id = %session.id(), "Session resumed");
					self.notify_started(&session);
					Resumed::Resumed
				} else {
					Resumed::AlreadyActive
				}
			}
		}
	}

	/// Restores a session observed elsewhere as current. Without both a start
	/// time and an id, there is no session and observers are told it paused.
	pub fn register_existing(
		&self,
		started_at: Option<DateTime<Utc>>,
		id: Option<SessionId>,
		user: Option<User>,
		unhandled: u32,
		handled: u32,
	) -> Option<Arc<Session>> {
		let session = match (started_at, id) {
			(Some(started_at), Some(id)) => Some(Arc::new(Session::restored(
				id, started_at, user, unhandled, handled,
			))),
			_ => None,
		};
		*self.current.write() = session.clone();

		match &session {
			Some(session) => {
				debug!(session_id = %session.id(), "Existing session registered");
				self.notify_started(session);
			}
			None => self.observers.notify(StateEvent::SessionPaused),
		}
		session
	}

	/// The current session, unless it is paused.
	pub fn current_session(&self) -> Option<Arc<Session>> {
		self
			.current
			.read()
			.as_ref()
			.filter(|session| !session.is_paused())
			.cloned()
	}

	pub fn increment_handled_and_copy(&self) -> Option<SessionSnapshot> {
		self
			.current_session()
			.map(|session| session.increment_handled_and_copy())
	}

	pub fn increment_unhandled_and_copy(&self) -> Option<SessionSnapshot> {
		self
			.current_session()
			.map(|session| session.increment_unhandled_and_copy())
	}

	/// Whether events should reference `session`: manual sessions always,
	/// auto-captured ones only while auto tracking is on.
	pub fn should_attach(&self, session: &Session) -> bool {
		self.config.auto_track_sessions || !session.is_auto_captured()
	}

	/// Records an activity entering or leaving the foreground.
	///
	/// Returns the session started automatically when the app comes back to
	/// the foreground after at least `session_timeout` in the background.
	pub fn update_foreground_tracker(
		&self,
		activity: &str,
		starting: bool,
		now: DateTime<Utc>,
	) -> Option<Arc<Session>> {
		let (should_start, in_foreground, context_activity) = {
			let mut state = self.foreground.lock();
			let mut should_start = false;

			if starting {
				if state.activities.is_empty() {
					state.last_entered = Some(now);
					let timed_out = match state.last_exited {
						None => true,
						Some(exited) => {
							(now - exited).to_std().unwrap_or(Duration::ZERO) >= self.config.session_timeout
						}
					};
					should_start = timed_out && self.config.auto_track_sessions;
				}
				state.activities.push(activity.to_string());
			} else {
				if let Some(pos) = state.activities.iter().position(|a| a == activity) {
					state.activities.remove(pos);
				}
				if state.activities.is_empty() {
					state.last_exited = Some(now);
				}
			}

			(
				should_start,
				!state.activities.is_empty(),
				state.activities.last().cloned(),
			)
		};

		let started = should_start.then(|| self.start_new_session(now, self.session_user(), true));

		self.observers.notify(StateEvent::ForegroundChanged {
			in_foreground,
			context_activity,
		});
		started
	}

	pub fn is_in_foreground(&self) -> bool {
		!self.foreground.lock().activities.is_empty()
	}

	/// The most recently foregrounded activity that is still in the foreground.
	pub fn context_activity(&self) -> Option<String> {
		self.foreground.lock().activities.last().cloned()
	}

	/// Time since the app last entered the foreground; zero in the background.
	pub fn duration_in_foreground(&self, now: DateTime<Utc>) -> Duration {
		let state = self.foreground.lock();
		match state.last_entered {
			Some(entered) if !state.activities.is_empty() => {
				(now - entered).to_std().unwrap_or(Duration::ZERO)
			}
			_ => Duration::ZERO,
		}
	}

	/// Decides whether `session` should be delivered and, if so, returns the
	/// payload after session callbacks have run. Succeeds at most once per
	/// session.
	pub fn prepare_delivery(
		&self,
		session: &Session,
		mut payload: SessionPayload,
		release_stage_enabled: bool,
	) -> Option<SessionPayload> {
		if !self.callbacks.on_session.run(&mut payload) {
			info!(session_id = %session.id(), "Session delivery vetoed by callback");
			return None;
		}
		if !release_stage_enabled || !self.should_attach(session) {
			return None;
		}
		if !session.mark_tracked() {
			return None;
		}
		Some(payload)
	}

	fn notify_started(&self, session: &Session) {
		let counts = session.counts();
		self.observers.notify(StateEvent::SessionStarted {
			id: session.id(),
			started_at: session.started_at(),
			handled: counts.handled,
			unhandled: counts.unhandled,
		});
	}
}

impl std::fmt::Debug for SessionTracker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionTracker")
			.field("config", &self.config)
			.field("current", &self.current.read().as_ref().map(|s| s.id()))
			.finish()
	}
}
