// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The reporting client: the entry point host applications talk to.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use loom_report_core::{
	AppState, Breadcrumb, BreadcrumbType, ErrorInfo, Event, HandledState, Metadata, Notifier,
	Session, SessionId, SessionPayload, SeverityReason, User,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::backtrace::capture_backtrace;
use crate::breadcrumbs::BreadcrumbRing;
use crate::callbacks::{CallbackId, CallbackState};
use crate::clock::{Clock, SystemClock};
use crate::config::ReportConfig;
use crate::delivery::{Delivery, DeliveryParams, HttpDelivery};
use crate::error::Result;
use crate::observer::{ObserverBus, ObserverId, StateEvent};
use crate::panic_hook;
use crate::pipeline::{DeliveryPipeline, FlushOutcome, PipelineSettings};
use crate::session_tracker::{Resumed, SessionTracker, SessionTrackerConfig};
use crate::snapshot::{AppSnapshot, DeviceSnapshot, StaticSnapshot};
use crate::worker::{BackgroundQueue, Executor, Task};

/// Breadcrumb left once the client is ready.
const LOADED_BREADCRUMB: &str = "Loom loaded";

/// Activity lifecycle transitions that leave navigation breadcrumbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityLifecycle {
	Created,
	Started,
	Resumed,
	Paused,
	Stopped,
	SaveInstanceState,
	Destroyed,
}

impl ActivityLifecycle {
	fn callback_name(self) -> &'static str {
		match self {
			Self::Created => "onCreate()",
			Self::Started => "onStart()",
			Self::Resumed => "onResume()",
			Self::Paused => "onPause()",
			Self::Stopped => "onStop()",
			Self::SaveInstanceState => "onSaveInstanceState()",
			Self::Destroyed => "onDestroy()",
		}
	}
}

/// Builder for constructing a [`ReportClient`].
pub struct ReportClientBuilder {
	config: ReportConfig,
	notifier: Notifier,
	delivery: Option<Arc<dyn Delivery>>,
	clock: Arc<dyn Clock>,
	app: Arc<dyn AppSnapshot>,
	device: Arc<dyn DeviceSnapshot>,
	runtime: Option<Handle>,
}

impl ReportClientBuilder {
	pub fn new() -> Self {
		let snapshot = Arc::new(StaticSnapshot::default());
		Self {
			config: ReportConfig::default(),
			notifier: Notifier::default(),
			delivery: None,
			clock: Arc::new(SystemClock),
			app: snapshot.clone(),
			device: snapshot,
			runtime: None,
		}
	}

	/// Replaces the whole configuration. Setters called afterwards still apply.
	pub fn config(mut self, config: ReportConfig) -> Self {
		self.config = config;
		self
	}

	/// Sets the project API key (32 hexadecimal characters).
	pub fn api_key(mut self, key: impl Into<String>) -> Self {
		self.config.api_key = key.into();
		self
	}

	/// Directory holding undelivered events and sessions.
	pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.storage_dir = dir.into();
		self
	}

	pub fn endpoints(mut self, notify: impl Into<String>, sessions: impl Into<String>) -> Self {
		self.config.endpoints.notify = notify.into();
		self.config.endpoints.sessions = sessions.into();
		self
	}

	/// Example: `production`, `staging`, `development`
	pub fn release_stage(mut self, stage: impl Into<String>) -> Self {
		self.config.release_stage = stage.into();
		self
	}

	/// Only these release stages report anything.
	pub fn enabled_release_stages<I, S>(mut self, stages: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.enabled_release_stages = Some(stages.into_iter().map(Into::into).collect());
		self
	}

	pub fn app_version(mut self, version: impl Into<String>) -> Self {
		self.config.app_version = Some(version.into());
		self
	}

	/// Enables or disables automatic session tracking.
	///
	/// When enabled (default), a session starts whenever the app returns to the
	/// foreground after more than the session timeout in the background.
	pub fn auto_track_sessions(mut self, enabled: bool) -> Self {
		self.config.auto_track_sessions = enabled;
		self
	}

	pub fn session_timeout(mut self, timeout: Duration) -> Self {
		self.config.session_timeout = timeout;
		self
	}

	/// Sets the maximum number of breadcrumbs to keep. Clamped to 100.
	pub fn max_breadcrumbs(mut self, max: usize) -> Self {
		self.config.max_breadcrumbs = max;
		self
	}

	pub fn enabled_breadcrumb_types(mut self, types: impl IntoIterator<Item = BreadcrumbType>) -> Self {
		self.config.enabled_breadcrumb_types = Some(types.into_iter().collect());
		self
	}

	pub fn max_persisted_events(mut self, max: usize) -> Self {
		self.config.max_persisted_events = max;
		self
	}

	pub fn max_persisted_sessions(mut self, max: usize) -> Self {
		self.config.max_persisted_sessions = max;
		self
	}

	pub fn worker_threads(mut self, threads: usize) -> Self {
		self.config.worker_threads = threads;
		self
	}

	pub fn queue_capacity(mut self, capacity: usize) -> Self {
		self.config.queue_capacity = capacity;
		self
	}

	/// Sets the HTTP request timeout. Ignored when a custom delivery is set.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	/// Error classes that are never reported.
	pub fn ignore_classes<I, S>(mut self, classes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.ignore_classes = classes.into_iter().map(Into::into).collect();
		self
	}

	pub fn notifier(mut self, notifier: Notifier) -> Self {
		self.notifier = notifier;
		self
	}

	/// Replaces the default HTTP transport.
	pub fn delivery(mut self, delivery: Arc<dyn Delivery>) -> Self {
		self.delivery = Some(delivery);
		self
	}

	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn app_snapshot(mut self, app: Arc<dyn AppSnapshot>) -> Self {
		self.app = app;
		self
	}

	pub fn device_snapshot(mut self, device: Arc<dyn DeviceSnapshot>) -> Self {
		self.device = device;
		self
	}

	/// Runs background work on an existing tokio runtime instead of a
	/// dedicated one.
	pub fn runtime_handle(mut self, handle: Handle) -> Self {
		self.runtime = Some(handle);
		self
	}

	/// Builds the client, then schedules a flush of anything stored by a
	/// previous run.
	pub fn build(self) -> Result<ReportClient> {
		let config = self.config.validate()?;

		let delivery: Arc<dyn Delivery> = match self.delivery {
			Some(delivery) => delivery,
			None => Arc::new(HttpDelivery::new(config.request_timeout)?),
		};

		let observers = Arc::new(ObserverBus::new());
		let callbacks = Arc::new(CallbackState::new());
		let tracker = Arc::new(SessionTracker::new(
			SessionTrackerConfig {
				auto_track_sessions: config.auto_track_sessions,
				session_timeout: config.session_timeout,
			},
			Arc::clone(&self.clock),
			Arc::clone(&observers),
			Arc::clone(&callbacks),
		));

		let app: Arc<dyn AppSnapshot> = Arc::new(AppOverlay {
			host: self.app,
			tracker: Arc::clone(&tracker),
			clock: Arc::clone(&self.clock),
			version: config.app_version.clone(),
			release_stage: config.release_stage.clone(),
		});

		let settings = PipelineSettings {
			api_key: config.api_key.clone(),
			notifier: self.notifier,
			event_params: DeliveryParams::for_events(&config.endpoints.notify, &config.api_key),
			session_params: DeliveryParams::for_sessions(&config.endpoints.sessions, &config.api_key),
			max_persisted_events: config.max_persisted_events,
			max_persisted_sessions: config.max_persisted_sessions,
		};
		let pipeline = Arc::new(DeliveryPipeline::open(
			&config.storage_dir,
			settings,
			delivery,
			Arc::clone(&app),
			Arc::clone(&self.device),
			Arc::clone(&observers),
		)?);

		let executor = match self.runtime {
			Some(handle) => Executor::borrowed(handle),
			None => Executor::owned(config.worker_threads)?,
		};
		let queue = BackgroundQueue::start(
			Arc::clone(&pipeline),
			executor,
			config.queue_capacity,
			config.worker_threads,
		)?;

		// Runs before any host callback so disabled types never reach them.
		let filter = config.clone();
		callbacks
			.on_breadcrumb
			.add(move |crumb: &mut Breadcrumb| filter.breadcrumb_type_enabled(crumb.kind));

		let breadcrumbs = BreadcrumbRing::new(config.max_breadcrumbs, Arc::clone(&observers));

		info!(
			release_stage = %config.release_stage,
			storage_dir = %config.storage_dir.display(),
			"Report client initialized"
		);

		let client = ReportClient {
			inner: Arc::new(ReportClientInner {
				config,
				clock: self.clock,
				app,
				device: self.device,
				observers,
				callbacks,
				breadcrumbs,
				tracker,
				pipeline,
				queue,
				metadata: RwLock::new(Metadata::new()),
				context: RwLock::new(None),
				closed: AtomicBool::new(false),
			}),
		};

		client.inner.queue.submit(Task::FlushEvents);
		client.inner.queue.submit(Task::FlushSessions);
		client.leave_auto_breadcrumb(LOADED_BREADCRUMB, BreadcrumbType::State, Map::new());
		Ok(client)
	}
}

impl Default for ReportClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Host app state with the fields the client owns filled in.
struct AppOverlay {
	host: Arc<dyn AppSnapshot>,
	tracker: Arc<SessionTracker>,
	clock: Arc<dyn Clock>,
	version: Option<String>,
	release_stage: String,
}

impl AppSnapshot for AppOverlay {
	fn current_app(&self) -> AppState {
		let mut app = self.host.current_app();
		if self.version.is_some() {
			app.version = self.version.clone();
		}
		app.release_stage = Some(self.release_stage.clone());
		app.in_foreground = Some(self.tracker.is_in_foreground());
		let in_foreground = self.tracker.duration_in_foreground(self.clock.now());
		app.duration_in_foreground_ms = Some(u64::try_from(in_foreground.as_millis()).unwrap_or(u64::MAX));
		app
	}
}

struct ReportClientInner {
	config: ReportConfig,
	clock: Arc<dyn Clock>,
	app: Arc<dyn AppSnapshot>,
	device: Arc<dyn DeviceSnapshot>,
	observers: Arc<ObserverBus>,
	callbacks: Arc<CallbackState>,
	breadcrumbs: BreadcrumbRing,
	tracker: Arc<SessionTracker>,
	pipeline: Arc<DeliveryPipeline>,
	queue: BackgroundQueue,
	metadata: RwLock<Metadata>,
	context: RwLock<Option<String>>,
	closed: AtomicBool,
}

/// Client for recording breadcrumbs, tracking sessions and reporting errors.
///
/// Every reporting call returns immediately: delivery happens on a background
/// queue, and anything that cannot be delivered is stored under
/// `storage_dir` and retried on the next launch or connectivity change.
///
/// # Example
///
/// ```ignore
/// use loom_report::ReportClient;
///
/// let client = ReportClient::builder()
///     .api_key("0123456789abcdef0123456789abcdef")
///     .storage_dir("/var/lib/my-app/reports")
///     .app_version(env!("CARGO_PKG_VERSION"))
///     .build()?;
///
/// client.install_panic_hook();
/// client.leave_breadcrumb("Checkout opened");
///
/// if let Err(e) = do_something() {
///     client.notify(&e);
/// }
///
/// client.shutdown().await;
/// ```
#[derive(Clone)]
pub struct ReportClient {
	inner: Arc<ReportClientInner>,
}

impl ReportClient {
	pub fn builder() -> ReportClientBuilder {
		ReportClientBuilder::new()
	}

	pub fn config(&self) -> &ReportConfig {
		&self.inner.config
	}

	/// Reports every panic as an unhandled event before the previously
	/// installed hook runs.
	pub fn install_panic_hook(&self) {
		panic_hook::install_panic_hook(self.clone());
		info!("Panic hook installed");
	}

	// Sessions

	/// Starts a new manual session, replacing the current one.
	pub fn start_session(&self) {
		let session = self.inner.tracker.start_session(false);
		self.track_session(&session);
	}

	pub fn pause_session(&self) {
		self.inner.tracker.pause_session();
	}

	/// Resumes the paused session. Returns false if there was no session and a
	/// new one was started instead.
	pub fn resume_session(&self) -> bool {
		let resumed = self.inner.tracker.resume_session();
		if let Resumed::Started(session) = &resumed {
			self.track_session(session);
		}
		resumed.resumed()
	}

	/// Adopts a session that was started elsewhere, such as by a previous
	/// process. The session is not delivered again.
	pub fn register_existing_session(
		&self,
		started_at: Option<DateTime<Utc>>,
		id: Option<SessionId>,
		user: Option<User>,
		unhandled: u32,
		handled: u32,
	) -> Option<Arc<Session>> {
		self
			.inner
			.tracker
			.register_existing(started_at, id, user, unhandled, handled)
	}

	pub fn current_session(&self) -> Option<Arc<Session>> {
		self.inner.tracker.current_session()
	}

	fn track_session(&self, session: &Session) {
		let payload = SessionPayload {
			notifier: self.inner.pipeline.settings().notifier.clone(),
			app: self.inner.app.current_app(),
			device: self.inner.device.current_device(),
			sessions: vec![session.snapshot()],
		};
		let release_stage_enabled = self.inner.config.release_stage_enabled();
		if let Some(payload) = self
			.inner
			.tracker
			.prepare_delivery(session, payload, release_stage_enabled)
		{
			debug!(session_id = %session.id(), "Scheduling session delivery");
			self.inner.queue.submit(Task::DeliverSession(payload));
		}
	}

	// Activity lifecycle

	pub fn activity_created(&self, activity: &str) {
		self.activity_lifecycle(activity, ActivityLifecycle::Created);
	}

	pub fn activity_started(&self, activity: &str) {
		self.activity_lifecycle(activity, ActivityLifecycle::Started);
	}

	pub fn activity_resumed(&self, activity: &str) {
		self.activity_lifecycle(activity, ActivityLifecycle::Resumed);
	}

	pub fn activity_paused(&self, activity: &str) {
		self.activity_lifecycle(activity, ActivityLifecycle::Paused);
	}

	pub fn activity_stopped(&self, activity: &str) {
		self.activity_lifecycle(activity, ActivityLifecycle::Stopped);
	}

	pub fn activity_save_instance_state(&self, activity: &str) {
		self.activity_lifecycle(activity, ActivityLifecycle::SaveInstanceState);
	}

	pub fn activity_destroyed(&self, activity: &str) {
		self.activity_lifecycle(activity, ActivityLifecycle::Destroyed);
	}

	/// Leaves a navigation breadcrumb for `transition`. Started and stopped
	/// also move `activity` in and out of the foreground, which may start an
	/// automatic session.
	pub fn activity_lifecycle(&self, activity: &str, transition: ActivityLifecycle) {
		let mut metadata = Map::new();
		metadata.insert(
			"ActivityLifecycle".to_string(),
			Value::from(transition.callback_name()),
		);
		self.leave_auto_breadcrumb(activity, BreadcrumbType::Navigation, metadata);

		let starting = match transition {
			ActivityLifecycle::Started => true,
			ActivityLifecycle::Stopped => false,
			_ => return,
		};
		let now = self.inner.clock.now();
		if let Some(session) = self
			.inner
			.tracker
			.update_foreground_tracker(activity, starting, now)
		{
			self.track_session(&session);
		}
	}

	pub fn is_in_foreground(&self) -> bool {
		self.inner.tracker.is_in_foreground()
	}

	/// The most recently started activity still in the foreground.
	pub fn context_activity(&self) -> Option<String> {
		self.inner.tracker.context_activity()
	}

	pub fn duration_in_foreground(&self) -> Duration {
		self.inner.tracker.duration_in_foreground(self.inner.clock.now())
	}

	// Breadcrumbs

	/// Leaves a manual breadcrumb.
	pub fn leave_breadcrumb(&self, message: impl Into<String>) {
		self.add_breadcrumb(Breadcrumb::manual(message, self.inner.clock.now()));
	}

	pub fn leave_breadcrumb_with(
		&self,
		message: impl Into<String>,
		kind: BreadcrumbType,
		metadata: Map<String, Value>,
	) {
		self.add_breadcrumb(Breadcrumb::new(message, kind, metadata, self.inner.clock.now()));
	}

	fn leave_auto_breadcrumb(&self, message: &str, kind: BreadcrumbType, metadata: Map<String, Value>) {
		self.add_breadcrumb(Breadcrumb::new(message, kind, metadata, self.inner.clock.now()));
	}

	fn add_breadcrumb(&self, mut breadcrumb: Breadcrumb) {
		if !self.inner.callbacks.on_breadcrumb.run(&mut breadcrumb) {
			debug!(kind = %breadcrumb.kind, "Breadcrumb discarded by callback");
			return;
		}
		self.inner.breadcrumbs.add(breadcrumb);
	}

	/// Breadcrumbs currently held, oldest first.
	pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
		self.inner.breadcrumbs.snapshot()
	}

	// Errors

	/// Reports a handled error.
	pub fn notify<E>(&self, error: &E)
	where
		E: std::error::Error + ?Sized,
	{
		self.notify_error(
			error_info(error),
			HandledState::new(SeverityReason::HandledException),
			None::<fn(&mut Event) -> bool>,
		);
	}

	/// Reports a handled error, running `on_error` after the registered error
	/// callbacks. Returning false from it discards the event.
	pub fn notify_with<E, F>(&self, error: &E, on_error: F)
	where
		E: std::error::Error + ?Sized,
		F: FnOnce(&mut Event) -> bool,
	{
		self.notify_error(
			error_info(error),
			HandledState::new(SeverityReason::HandledException),
			Some(on_error),
		);
	}

	/// Reports a prepared error with an explicit handled state.
	pub fn notify_error<F>(&self, error: ErrorInfo, handled_state: HandledState, on_error: Option<F>)
	where
		F: FnOnce(&mut Event) -> bool,
	{
		let event = Event::new(error, handled_state, self.inner.clock.now());
		self.notify_internal(event, Metadata::new(), on_error);
	}

	/// Reports an error that is about to take the process down. The event is
	/// written to disk before this returns.
	pub fn notify_unhandled(&self, error: ErrorInfo, handled_state: HandledState, metadata: Metadata) {
		let event = Event::new(error, handled_state, self.inner.clock.now());
		self.notify_internal(event, metadata, None::<fn(&mut Event) -> bool>);
	}

	fn notify_internal<F>(&self, mut event: Event, extra_metadata: Metadata, on_error: Option<F>)
	where
		F: FnOnce(&mut Event) -> bool,
	{
		let inner = &self.inner;
		if event.should_ignore(&inner.config.ignore_classes) {
			debug!("Skipping notification for ignored error class");
			return;
		}
		if !inner.config.release_stage_enabled() {
			debug!(release_stage = %inner.config.release_stage, "Skipping notification for disabled release stage");
			return;
		}

		let session = inner
			.tracker
			.current_session()
			.filter(|session| inner.tracker.should_attach(session));
		event.session = session.as_ref().map(|session| session.snapshot());

		event.app = inner.app.current_app();
		event.device = inner.device.current_device();
		event.breadcrumbs = inner.breadcrumbs.snapshot();
		event.user = inner.tracker.user();
		event.metadata = inner.metadata.read().clone();
		event.metadata.merge(&extra_metadata);
		if event.context.is_none() {
			event.context = inner
				.context
				.read()
				.clone()
				.or_else(|| inner.tracker.context_activity());
		}

		let mut proceed = inner.callbacks.on_error.run(&mut event);
		if proceed {
			if let Some(on_error) = on_error {
				proceed = catch_unwind(AssertUnwindSafe(|| on_error(&mut event))).unwrap_or_else(|_| {
					warn!("One-shot error callback panicked; continuing");
					true
				});
			}
		}
		if !proceed {
			info!("Skipping notification - error callback returned false");
			return;
		}

		// Count the event against the session it references, if a callback
		// has not detached it.
		let unhandled = event.is_unhandled();
		if event.session.is_some() {
			event.session = session.map(|session| {
				if unhandled {
					session.increment_unhandled_and_copy()
				} else {
					session.increment_handled_and_copy()
				}
			});
		}

		let crumb = error_breadcrumb(&event);
		if unhandled {
			inner.pipeline.persist_event(&event);
			inner.queue.submit(Task::FlushEvents);
		} else {
			inner.queue.submit(Task::DeliverEvent(Box::new(event)));
		}
		if let Some((message, metadata)) = crumb {
			self.leave_auto_breadcrumb(&message, BreadcrumbType::Error, metadata);
		}
	}

	// Callbacks and observers

	pub fn add_on_error<F>(&self, callback: F) -> CallbackId
	where
		F: Fn(&mut Event) -> bool + Send + Sync + 'static,
	{
		self.inner.callbacks.on_error.add(callback)
	}

	pub fn remove_on_error(&self, id: CallbackId) -> bool {
		self.inner.callbacks.on_error.remove(id)
	}

	pub fn add_on_breadcrumb<F>(&self, callback: F) -> CallbackId
	where
		F: Fn(&mut Breadcrumb) -> bool + Send + Sync + 'static,
	{
		self.inner.callbacks.on_breadcrumb.add(callback)
	}

	pub fn remove_on_breadcrumb(&self, id: CallbackId) -> bool {
		self.inner.callbacks.on_breadcrumb.remove(id)
	}

	pub fn add_on_session<F>(&self, callback: F) -> CallbackId
	where
		F: Fn(&mut SessionPayload) -> bool + Send + Sync + 'static,
	{
		self.inner.callbacks.on_session.add(callback)
	}

	pub fn remove_on_session(&self, id: CallbackId) -> bool {
		self.inner.callbacks.on_session.remove(id)
	}

	pub fn register_observer<F>(&self, observer: F) -> ObserverId
	where
		F: Fn(&StateEvent) + Send + Sync + 'static,
	{
		self.inner.observers.register(observer)
	}

	pub fn unregister_observer(&self, id: ObserverId) -> bool {
		self.inner.observers.unregister(id)
	}

	/// A channel of state changes. Slow receivers miss events rather than
	/// holding up the client.
	pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
		self.inner.observers.subscribe()
	}

	// User, context and metadata

	pub fn set_user(&self, id: Option<String>, email: Option<String>, name: Option<String>) {
		self.inner.tracker.set_user(User::new(id, email, name));
	}

	pub fn user(&self) -> User {
		self.inner.tracker.user()
	}

	/// Overrides the context of future events. `None` falls back to the
	/// foreground activity.
	pub fn set_context(&self, context: Option<String>) {
		*self.inner.context.write() = context;
	}

	pub fn context(&self) -> Option<String> {
		self.inner.context.read().clone()
	}

	pub fn add_metadata(&self, section: impl Into<String>, key: impl Into<String>, value: Value) {
		self.inner.metadata.write().add(section, key, value);
	}

	pub fn add_metadata_section(&self, section: impl Into<String>, values: Map<String, Value>) {
		self.inner.metadata.write().add_section(section, values);
	}

	/// Clears a whole section, or one key of it.
	pub fn clear_metadata(&self, section: &str, key: Option<&str>) {
		let mut metadata = self.inner.metadata.write();
		match key {
			Some(key) => metadata.clear_key(section, key),
			None => metadata.clear_section(section),
		}
	}

	pub fn metadata(&self, section: &str) -> Option<Map<String, Value>> {
		self.inner.metadata.read().section(section).cloned()
	}

	// Delivery

	/// Tells the client whether the network is reachable. Regaining it
	/// schedules a flush of stored events.
	pub fn connectivity_changed(&self, connected: bool) {
		let mut metadata = Map::new();
		metadata.insert("hasConnection".to_string(), Value::from(connected));
		self.leave_auto_breadcrumb("Connectivity change", BreadcrumbType::State, metadata);

		if connected {
			self.inner.queue.submit(Task::FlushEvents);
		}
	}

	/// Retries stored events on the calling task.
	pub async fn flush_events(&self) -> FlushOutcome {
		self.inner.pipeline.flush_stored_events().await
	}

	/// Retries stored sessions on the calling task.
	pub async fn flush_sessions(&self) -> FlushOutcome {
		self.inner.pipeline.flush_stored_sessions().await
	}

	pub async fn flush(&self) {
		self.flush_events().await;
		self.flush_sessions().await;
	}

	/// Waits until every queued background task has finished.
	pub async fn drain(&self) {
		self.inner.queue.wait_idle().await;
	}

	pub fn pipeline(&self) -> &DeliveryPipeline {
		&self.inner.pipeline
	}

	/// Stops the background queue after in-flight work completes. Reports
	/// made afterwards are stored for the next run.
	pub async fn shutdown(&self) {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		info!("Shutting down report client");
		self.inner.queue.shutdown().await;
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}
}

impl std::fmt::Debug for ReportClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ReportClient")
			.field("release_stage", &self.inner.config.release_stage)
			.field("closed", &self.is_closed())
			.finish()
	}
}

fn error_info<E>(error: &E) -> ErrorInfo
where
	E: std::error::Error + ?Sized,
{
	ErrorInfo::new(std::any::type_name::<E>(), error.to_string()).with_stacktrace(capture_backtrace())
}

/// Name and metadata of the breadcrumb recorded after an error is reported.
fn error_breadcrumb(event: &Event) -> Option<(String, Map<String, Value>)> {
	let error = event.errors.first()?;
	let mut metadata = Map::new();
	metadata.insert("errorClass".to_string(), Value::from(error.error_class.clone()));
	metadata.insert("message".to_string(), Value::from(error.message.clone()));
	metadata.insert("unhandled".to_string(), Value::from(event.is_unhandled().to_string()));
	metadata.insert("severity".to_string(), Value::from(event.severity().to_string()));
	Some((error.error_class.clone(), metadata))
}
