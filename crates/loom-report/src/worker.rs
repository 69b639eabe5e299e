// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded background queue for delivery and flush work.
//!
//! `submit` never blocks. If the queue is full or already shut down, payloads
//! are written to the store on the calling thread instead, and flush requests
//! are dropped since the next flush trigger covers them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use loom_report_core::{Event, SessionPayload};
use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};
use crate::pipeline::DeliveryPipeline;

/// A unit of background work.
#[derive(Debug)]
pub enum Task {
	DeliverEvent(Box<Event>),
	DeliverSession(SessionPayload),
	FlushEvents,
	FlushSessions,
}

impl Task {
	fn name(&self) -> &'static str {
		match self {
			Self::DeliverEvent(_) => "deliver_event",
			Self::DeliverSession(_) => "deliver_session",
			Self::FlushEvents => "flush_events",
			Self::FlushSessions => "flush_sessions",
		}
	}
}

/// How a submitted task was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
	Queued,
	/// The queue could not take it; any payload was stored inline.
	Fallback,
}

/// The runtime background tasks run on.
pub enum Executor {
	Owned(Option<Runtime>),
	Borrowed(Handle),
}

impl Executor {
	/// A dedicated multi-thread runtime.
	pub fn owned(worker_threads: usize) -> Result<Self> {
		let runtime = tokio::runtime::Builder::new_multi_thread()
			.worker_threads(worker_threads)
			.thread_name("loom-report")
			.enable_all()
			.build()
			.map_err(|e| ReportError::RuntimeBuild(e.to_string()))?;
		Ok(Self::Owned(Some(runtime)))
	}

	pub fn borrowed(handle: Handle) -> Self {
		Self::Borrowed(handle)
	}

	fn handle(&self) -> Result<Handle> {
		match self {
			Self::Owned(Some(runtime)) => Ok(runtime.handle().clone()),
			Self::Owned(None) => Err(ReportError::ClientShutdown),
			Self::Borrowed(handle) => Ok(handle.clone()),
		}
	}
}

impl Drop for Executor {
	fn drop(&mut self) {
		if let Self::Owned(runtime) = self {
			if let Some(runtime) = runtime.take() {
				// Safe to call from inside another runtime.
				runtime.shutdown_background();
			}
		}
	}
}

impl std::fmt::Debug for Executor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Owned(_) => write!(f, "Executor::Owned"),
			Self::Borrowed(_) => write!(f, "Executor::Borrowed"),
		}
	}
}

struct PendingGuard {
	pending: Arc<AtomicUsize>,
	idle: Arc<Notify>,
}

impl Drop for PendingGuard {
	fn drop(&mut self) {
		if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
			self.idle.notify_waiters();
		}
	}
}

pub struct BackgroundQueue {
	pipeline: Arc<DeliveryPipeline>,
	sender: Mutex<Option<mpsc::Sender<Task>>>,
	dispatcher: Mutex<Option<JoinHandle<()>>>,
	pending: Arc<AtomicUsize>,
	idle: Arc<Notify>,
	// Declared last so the runtime outlives the handles above when dropped.
	executor: Executor,
}

impl BackgroundQueue {
	/// Starts the dispatcher. At most `concurrency` tasks run at once and at
	/// most `capacity` wait in the queue.
	pub fn start(
		pipeline: Arc<DeliveryPipeline>,
		executor: Executor,
		capacity: usize,
		concurrency: usize,
	) -> Result<Self> {
		let (tx, rx) = mpsc::channel(capacity.max(1));
		let pending = Arc::new(AtomicUsize::new(0));
		let idle = Arc::new(Notify::new());

		let handle = executor.handle()?;
		let dispatcher = handle.spawn(dispatch(
			rx,
			Arc::clone(&pipeline),
			concurrency.max(1),
			Arc::clone(&pending),
			Arc::clone(&idle),
		));

		debug!(capacity, concurrency, "Background queue started");
		Ok(Self {
			pipeline,
			sender: Mutex::new(Some(tx)),
			dispatcher: Mutex::new(Some(dispatcher)),
			pending,
			idle,
			executor,
		})
	}

	pub fn submit(&self, task: Task) -> Submitted {
		self.pending.fetch_add(1, Ordering::SeqCst);
		let result = match self.sender.lock().as_ref() {
			Some(tx) => tx.try_send(task),
			None => Err(TrySendError::Closed(task)),
		};

		match result {
			Ok(()) => Submitted::Queued,
			Err(e) => {
				// Never queued, so never counted by the dispatcher.
				drop(PendingGuard {
					pending: Arc::clone(&self.pending),
					idle: Arc::clone(&self.idle),
				});
				let (reason, task) = match e {
					TrySendError::Full(task) => ("full", task),
					TrySendError::Closed(task) => ("closed", task),
				};
				warn!(reason, task = task.name(), "Background queue unavailable; running fallback inline");
				self.run_fallback(task);
				Submitted::Fallback
			}
		}
	}

	fn run_fallback(&self, task: Task) {
		match task {
			Task::DeliverEvent(event) => {
				self.pipeline.persist_event(&event);
			}
			Task::DeliverSession(payload) => {
				self.pipeline.persist_sessions(&payload.sessions);
			}
			flush @ (Task::FlushEvents | Task::FlushSessions) => {
				debug!(task = flush.name(), "Dropping flush request");
			}
		}
	}

	/// Number of queued or running tasks.
	pub fn pending(&self) -> usize {
		self.pending.load(Ordering::SeqCst)
	}

	/// Resolves once no task is queued or running.
	pub async fn wait_idle(&self) {
		loop {
			let notified = self.idle.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();
			if self.pending.load(Ordering::SeqCst) == 0 {
				return;
			}
			notified.await;
		}
	}

	/// Stops accepting work and waits for queued and running tasks to finish.
	pub async fn shutdown(&self) {
		let sender = self.sender.lock().take();
		if sender.is_none() {
			return;
		}
		drop(sender);

		let dispatcher = self.dispatcher.lock().take();
		if let Some(dispatcher) = dispatcher {
			if let Err(e) = dispatcher.await {
				warn!(error = %e, "Background dispatcher ended abnormally");
			}
		}
		info!("Background queue stopped");
	}

	pub fn is_shut_down(&self) -> bool {
		self.sender.lock().is_none()
	}
}

impl std::fmt::Debug for BackgroundQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BackgroundQueue")
			.field("pending", &self.pending())
			.field("executor", &self.executor)
			.finish()
	}
}

async fn dispatch(
	mut rx: mpsc::Receiver<Task>,
	pipeline: Arc<DeliveryPipeline>,
	concurrency: usize,
	pending: Arc<AtomicUsize>,
	idle: Arc<Notify>,
) {
	let limit = Arc::new(Semaphore::new(concurrency));

	while let Some(task) = rx.recv().await {
		let guard = PendingGuard {
			pending: Arc::clone(&pending),
			idle: Arc::clone(&idle),
		};
		let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
			break;
		};
		let pipeline = Arc::clone(&pipeline);
		tokio::spawn(async move {
			run_task(&pipeline, task).await;
			drop(guard);
			drop(permit);
		});
	}

	// Wait for in-flight tasks.
	let permits = u32::try_from(concurrency).unwrap_or(u32::MAX);
	let _ = limit.acquire_many(permits).await;
}

async fn run_task(pipeline: &DeliveryPipeline, task: Task) {
	match task {
		Task::DeliverEvent(event) => {
			pipeline.deliver_event(*event).await;
		}
		Task::DeliverSession(payload) => {
			pipeline.deliver_session(payload).await;
		}
		Task::FlushEvents => {
			pipeline.flush_stored_events().await;
		}
		Task::FlushSessions => {
			pipeline.flush_stored_sessions().await;
		}
	}
}
