// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Context types attached to reports (user, app, device).
//!
//! App and device state are produced by host-side collectors; this crate only
//! carries them. A handful of common fields are typed, everything else rides in
//! `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The user associated with a session or event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub id: Option<String>,
	pub email: Option<String>,
	pub name: Option<String>,
}

impl User {
	pub fn new(id: Option<String>, email: Option<String>, name: Option<String>) -> Self {
		Self { id, email, name }
	}

	pub fn is_empty(&self) -> bool {
		self.id.is_none() && self.email.is_none() && self.name.is_none()
	}
}

/// Snapshot of application state at the time a report was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
	pub id: Option<String>,
	pub version: Option<String>,
	pub release_stage: Option<String>,
	pub in_foreground: Option<bool>,
	pub duration_in_foreground_ms: Option<u64>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Snapshot of device state at the time a report was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
	pub id: Option<String>,
	pub manufacturer: Option<String>,
	pub model: Option<String>,
	pub os_name: Option<String>,
	pub os_version: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
