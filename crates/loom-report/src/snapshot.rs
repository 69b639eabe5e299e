// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Producers of app and device state. Collecting that state is the host's
//! job; the client only asks for a fresh copy whenever it builds a payload.

use loom_report_core::{AppState, DeviceState};

pub trait AppSnapshot: Send + Sync {
	fn current_app(&self) -> AppState;
}

pub trait DeviceSnapshot: Send + Sync {
	fn current_device(&self) -> DeviceState;
}

impl<F> AppSnapshot for F
where
	F: Fn() -> AppState + Send + Sync,
{
	fn current_app(&self) -> AppState {
		self()
	}
}

impl<F> DeviceSnapshot for F
where
	F: Fn() -> DeviceState + Send + Sync,
{
	fn current_device(&self) -> DeviceState {
		self()
	}
}

/// Fixed app and device state, for hosts that collect it once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshot {
	pub app: AppState,
	pub device: DeviceState,
}

impl AppSnapshot for StaticSnapshot {
	fn current_app(&self) -> AppState {
		self.app.clone()
	}
}

impl DeviceSnapshot for StaticSnapshot {
	fn current_device(&self) -> DeviceState {
		self.device.clone()
	}
}
