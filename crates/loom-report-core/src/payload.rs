// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery payload wrappers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::context::{AppState, DeviceState};
use crate::error::CoreError;
use crate::event::Event;
use crate::session::SessionSnapshot;

/// Identifies the client library that produced a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifier {
	pub name: String,
	pub version: String,
	pub url: String,
}

impl Default for Notifier {
	fn default() -> Self {
		Self {
			name: "Loom Rust Notifier".to_string(),
			version: env!("CARGO_PKG_VERSION").to_string(),
			url: "https://github.com/ghuntley/loom".to_string(),
		}
	}
}

/// One or more events bound for the notify endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
	pub api_key: String,
	pub notifier: Notifier,
	pub events: Vec<Event>,
}

impl EventPayload {
	pub fn new(api_key: impl Into<String>, notifier: Notifier, event: Event) -> Self {
		Self {
			api_key: api_key.into(),
			notifier,
			events: vec![event],
		}
	}
}

/// One or more sessions bound for the sessions endpoint.
///
/// Session callbacks receive this wrapper by `&mut`, so they can adjust the
/// app and device data that goes out with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
	pub notifier: Notifier,
	pub app: AppState,
	pub device: DeviceState,
	pub sessions: Vec<SessionSnapshot>,
}

/// Which kind of payload a stored record or delivery outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
	Event,
	Session,
}

impl fmt::Display for PayloadKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Event => write!(f, "event"),
			Self::Session => write!(f, "session"),
		}
	}
}

impl FromStr for PayloadKind {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"event" => Ok(Self::Event),
			"session" => Ok(Self::Session),
			_ => Err(CoreError::InvalidPayloadKind(s.to_string())),
		}
	}
}
