// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Panic hook that reports panics as unhandled events.

use std::any::Any;
use std::cell::Cell;
use std::panic::PanicHookInfo;

use loom_report_core::{ErrorInfo, HandledState, Metadata, SeverityReason};
use serde_json::Value;
use tracing::warn;

use crate::backtrace::capture_backtrace;
use crate::client::ReportClient;

/// Error class used for panics.
pub const PANIC_ERROR_CLASS: &str = "panic";

thread_local! {
	static REPORTING: Cell<bool> = const { Cell::new(false) };
}

/// Installs a hook that stores each panic as an unhandled event, then runs the
/// previously installed hook.
pub fn install_panic_hook(client: ReportClient) {
	let previous = std::panic::take_hook();

	std::panic::set_hook(Box::new(move |info| {
		// A panic raised while reporting a panic goes straight to the old hook.
		if !REPORTING.with(|flag| flag.replace(true)) {
			report_panic(&client, info);
			REPORTING.with(|flag| flag.set(false));
		}
		previous(info);
	}));
}

fn report_panic(client: &ReportClient, info: &PanicHookInfo<'_>) {
	let error = ErrorInfo::new(PANIC_ERROR_CLASS, panic_message(info.payload()))
		.with_stacktrace(capture_backtrace());

	let mut metadata = Metadata::new();
	if let Some(location) = info.location() {
		metadata.add("panic", "file", Value::from(location.file()));
		metadata.add("panic", "line", Value::from(location.line()));
		metadata.add("panic", "column", Value::from(location.column()));
	}
	if let Some(name) = std::thread::current().name() {
		metadata.add("panic", "thread", Value::from(name));
	}

	// A panic inside a panic hook aborts the process, so callbacks and
	// observers run on a helper thread where their panics can unwind.
	std::thread::scope(|scope| {
		let reporter = std::thread::Builder::new()
			.name("loom-report-panic".to_string())
			.spawn_scoped(scope, || {
				REPORTING.with(|flag| flag.set(true));
				client.notify_unhandled(
					error,
					HandledState::new(SeverityReason::UnhandledPanic),
					metadata,
				);
			});
		match reporter {
			Ok(handle) => {
				if handle.join().is_err() {
					warn!("Panic report did not complete");
				}
			}
			Err(e) => warn!(error = %e, "Failed to spawn panic reporter"),
		}
	});
}

/// The message from a panic payload, if it is a string.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"Box<dyn Any>".to_string()
	}
}
