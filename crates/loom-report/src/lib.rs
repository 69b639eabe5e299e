// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process error reporting client for Loom.
//!
//! The client captures breadcrumbs, tracks user sessions and reports errors to
//! the Loom collector. Reporting never blocks the caller on the network:
//! payloads go through a bounded background queue, and anything the collector
//! cannot take right now is written to disk and retried later.
//!
//! # Overview
//!
//! - [`BreadcrumbRing`] keeps the most recent breadcrumbs.
//! - [`CallbackChain`]s let the host edit or veto errors, breadcrumbs and
//!   sessions before they are recorded.
//! - [`SessionTracker`] owns the current session and starts new ones when the
//!   app comes back to the foreground after a timeout.
//! - [`FileStore`] persists undelivered events and sessions atomically.
//! - [`DeliveryPipeline`] sends payloads through a [`Delivery`] and decides,
//!   per outcome, whether to keep, retry or drop them.
//! - [`ObserverBus`] broadcasts state changes to interested listeners.
//!
//! # Example
//!
//! ```ignore
//! use loom_report::ReportClient;
//!
//! let client = ReportClient::builder()
//!     .api_key("0123456789abcdef0123456789abcdef")
//!     .storage_dir("/var/lib/my-app/reports")
//!     .build()?;
//!
//! client.install_panic_hook();
//! client.activity_started("MainActivity");
//! client.leave_breadcrumb("Opened settings");
//! ```

pub mod backtrace;
pub mod breadcrumbs;
pub mod callbacks;
pub mod client;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod observer;
pub mod panic_hook;
pub mod pipeline;
pub mod session_tracker;
pub mod snapshot;
pub mod store;
pub mod worker;

pub use backtrace::capture_backtrace;
pub use breadcrumbs::BreadcrumbRing;
pub use callbacks::{CallbackChain, CallbackId, CallbackState};
pub use client::{ActivityLifecycle, ReportClient, ReportClientBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Endpoints, ReportConfig, MAX_BREADCRUMBS_LIMIT};
pub use delivery::{Delivery, DeliveryParams, DeliveryStatus, HttpDelivery};
pub use error::{ReportError, Result};
pub use observer::{ObserverBus, ObserverId, StateEvent};
pub use panic_hook::install_panic_hook;
pub use pipeline::{DeliveryPipeline, FlushOutcome, FlushSummary, PipelineSettings};
pub use session_tracker::{Resumed, SessionTracker, SessionTrackerConfig};
pub use snapshot::{AppSnapshot, DeviceSnapshot, StaticSnapshot};
pub use store::{FileStore, StoredRecord};
pub use worker::{BackgroundQueue, Executor, Submitted, Task};

pub use loom_report_core::{
	AppState, Breadcrumb, BreadcrumbType, DeviceState, ErrorInfo, Event, EventCounts, EventPayload,
	Frame, HandledState, Metadata, Notifier, PayloadKind, Session, SessionId, SessionPayload,
	SessionSnapshot, Severity, SeverityReason, Stacktrace, User,
};
