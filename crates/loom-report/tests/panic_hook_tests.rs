// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The panic hook is process-wide, so it gets a test binary of its own.

mod common;

use std::sync::Arc;

use common::MockDelivery;
use loom_report::{DeliveryStatus, Event, Severity, SeverityReason};
use parking_lot::Mutex;

/// Tests in this binary swap the process-wide hook, so they take turns.
static HOOK: Mutex<()> = parking_lot::const_mutex(());

/// Test that a panic is written to disk as an unhandled event before the
/// previous hook runs.
/// **Why Important**: A panic may be the last thing the process does; the
/// report has to be on disk by the time the hook returns.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panic_is_stored_as_unhandled_event() {
	let _hook = HOOK.lock();
	let delivery = Arc::new(MockDelivery::new(&[], DeliveryStatus::Undelivered));
	let (builder, _clock, _dir) = common::builder(&delivery);
	let client = builder.build().unwrap();
	client.drain().await;
	client.start_session();
	client.install_panic_hook();

	let result = std::panic::catch_unwind(|| {
		panic!("checkout total was negative");
	});
	assert!(result.is_err());
	let _ = std::panic::take_hook();

	client.drain().await;
	let store = client.pipeline().event_store();
	let records = store.enumerate().unwrap();
	assert_eq!(records.len(), 1);

	let event: Event = store.read(&records[0]).unwrap();
	assert!(event.is_unhandled());
	assert_eq!(event.severity(), Severity::Error);
	assert_eq!(event.handled_state.reason, SeverityReason::UnhandledPanic);
	assert_eq!(event.errors[0].error_class, "panic");
	assert_eq!(event.errors[0].message, "checkout total was negative");
	assert!(event.metadata.get("panic", "line").is_some());
	assert_eq!(event.session.as_ref().unwrap().events.unhandled, 1);
}

/// Test that a panicking `on_error` callback does not abort a panic report.
/// **Why Important**: A panic inside a panic hook cannot unwind. A buggy
/// callback must not turn a recoverable panic into a process abort.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_callback_during_panic_report_is_contained() {
	let _hook = HOOK.lock();
	let delivery = Arc::new(MockDelivery::new(&[], DeliveryStatus::Undelivered));
	let (builder, _clock, _dir) = common::builder(&delivery);
	let client = builder.build().unwrap();
	client.drain().await;
	client.add_on_error(|_| panic!("integration callback bug"));
	client.install_panic_hook();

	let result = std::panic::catch_unwind(|| {
		panic!("cart was empty");
	});
	assert!(result.is_err());
	let _ = std::panic::take_hook();

	client.drain().await;
	let store = client.pipeline().event_store();
	let records = store.enumerate().unwrap();
	assert_eq!(records.len(), 1);
	let event: Event = store.read(&records[0]).unwrap();
	assert_eq!(event.errors[0].message, "cart was empty");
	assert!(event.is_unhandled());
}
