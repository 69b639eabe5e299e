// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom error reporting client.
//!
//! This crate holds the data model shared by the in-process reporting client
//! (`loom-report`) and anything that consumes its payloads: breadcrumbs,
//! sessions and their counters, error events, the app/device snapshots attached
//! to them, and the delivery payload wrappers.
//!
//! # Overview
//!
//! - [`Breadcrumb`]s are small, immutable, timestamped records of app activity.
//! - A [`Session`] is the live, mutable record of one period of app usage; a
//!   [`SessionSnapshot`] is the point-in-time copy that gets reported.
//! - An [`Event`] is one error report, built once per notify and mutable only
//!   while user callbacks run.
//! - [`EventPayload`] and [`SessionPayload`] wrap events and sessions for the
//!   collector.

pub mod breadcrumb;
pub mod context;
pub mod error;
pub mod event;
pub mod metadata;
pub mod payload;
pub mod session;

pub use breadcrumb::{Breadcrumb, BreadcrumbType, MAX_BREADCRUMB_MESSAGE_LEN};
pub use context::{AppState, DeviceState, User};
pub use error::{CoreError, Result};
pub use event::{ErrorInfo, Event, Frame, HandledState, Severity, SeverityReason, Stacktrace};
pub use metadata::Metadata;
pub use payload::{EventPayload, Notifier, PayloadKind, SessionPayload};
pub use session::{EventCounts, Session, SessionId, SessionSnapshot};
