// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ordered user callbacks that may mutate or veto a report.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use loom_report_core::{Breadcrumb, Event, SessionPayload};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Handle for removing a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type Callback<T> = Arc<dyn Fn(&mut T) -> bool + Send + Sync>;

/// An ordered list of `(subject) -> continue` callbacks.
///
/// `run` calls them in registration order and stops at the first `false`.
/// A panicking callback is logged and counts as `true`.
pub struct CallbackChain<T> {
	name: &'static str,
	callbacks: RwLock<Vec<(CallbackId, Callback<T>)>>,
	next_id: AtomicU64,
}

impl<T> CallbackChain<T> {
	pub fn new(name: &'static str) -> Self {
		Self {
			name,
			callbacks: RwLock::new(Vec::new()),
			next_id: AtomicU64::new(1),
		}
	}

	pub fn add<F>(&self, callback: F) -> CallbackId
	where
		F: Fn(&mut T) -> bool + Send + Sync + 'static,
	{
		let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
		self.callbacks.write().push((id, Arc::new(callback)));
		id
	}

	/// Removing an id that is not registered is a no-op.
	pub fn remove(&self, id: CallbackId) -> bool {
		let mut callbacks = self.callbacks.write();
		let before = callbacks.len();
		callbacks.retain(|(existing, _)| *existing != id);
		callbacks.len() != before
	}

	pub fn len(&self) -> usize {
		self.callbacks.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.callbacks.read().is_empty()
	}

	/// Runs the chain against `subject`. Returns false if any callback vetoed.
	pub fn run(&self, subject: &mut T) -> bool {
		// Snapshot so callbacks can add/remove without deadlocking.
		let callbacks: Vec<Callback<T>> = self
			.callbacks
			.read()
			.iter()
			.map(|(_, callback)| Arc::clone(callback))
			.collect();

		for (index, callback) in callbacks.iter().enumerate() {
			match catch_unwind(AssertUnwindSafe(|| callback(subject))) {
				Ok(true) => {}
				Ok(false) => {
					debug!(chain = self.name, index, "Callback vetoed");
					return false;
				}
				Err(_) => {
					warn!(chain = self.name, index, "Callback panicked; continuing");
				}
			}
		}
		true
	}
}

impl<T> std::fmt::Debug for CallbackChain<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CallbackChain")
			.field("name", &self.name)
			.field("len", &self.len())
			.finish()
	}
}

/// The three chains a client carries.
#[derive(Debug)]
pub struct CallbackState {
	pub on_error: CallbackChain<Event>,
	pub on_breadcrumb: CallbackChain<Breadcrumb>,
	pub on_session: CallbackChain<SessionPayload>,
}

impl CallbackState {
	pub fn new() -> Self {
		Self {
			on_error: CallbackChain::new("on_error"),
			on_breadcrumb: CallbackChain::new("on_breadcrumb"),
			on_session: CallbackChain::new("on_session"),
		}
	}
}

impl Default for CallbackState {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use proptest::prelude::*;

	fn recording_chain(results: &[bool]) -> (CallbackChain<u32>, Arc<Mutex<Vec<usize>>>) {
		let chain = CallbackChain::new("test");
		let calls = Arc::new(Mutex::new(Vec::new()));
		for (index, result) in results.iter().copied().enumerate() {
			let calls = Arc::clone(&calls);
			chain.add(move |_: &mut u32| {
				calls.lock().push(index);
				result
			});
		}
		(chain, calls)
	}

	#[test]
	fn test_short_circuits_on_first_veto() {
		let (chain, calls) = recording_chain(&[true, false, true]);
		let mut subject = 0;

		assert!(!chain.run(&mut subject));
		assert_eq!(*calls.lock(), vec![0, 1]);
	}

	#[test]
	fn test_empty_chain_continues() {
		let chain: CallbackChain<u32> = CallbackChain::new("test");
		assert!(chain.run(&mut 0));
		assert!(chain.is_empty());
	}

	#[test]
	fn test_callbacks_mutate_subject_in_order() {
		let chain = CallbackChain::new("test");
		chain.add(|n: &mut u32| {
			*n += 1;
			true
		});
		chain.add(|n: &mut u32| {
			*n *= 10;
			true
		});

		let mut subject = 1;
		assert!(chain.run(&mut subject));
		assert_eq!(subject, 20);
	}

	#[test]
	fn test_panicking_callback_does_not_veto() {
		let chain = CallbackChain::new("test");
		chain.add(|_: &mut u32| panic!("integration bug"));
		chain.add(|n: &mut u32| {
			*n = 7;
			true
		});

		let mut subject = 0;
		assert!(chain.run(&mut subject));
		assert_eq!(subject, 7);
	}

	#[test]
	fn test_remove_is_idempotent() {
		let chain = CallbackChain::new("test");
		let id = chain.add(|_: &mut u32| false);

		assert!(chain.remove(id));
		assert!(!chain.remove(id));
		assert!(chain.run(&mut 0));
	}

	#[test]
	fn test_callback_may_register_during_run() {
		let chain = Arc::new(CallbackChain::new("test"));
		let inner = Arc::clone(&chain);
		chain.add(move |_: &mut u32| {
			inner.add(|_: &mut u32| true);
			true
		});

		assert!(chain.run(&mut 0));
		assert_eq!(chain.len(), 2);
	}

	proptest! {
		#[test]
		fn run_stops_at_first_false(results in proptest::collection::vec(any::<bool>(), 0..12)) {
			let (chain, calls) = recording_chain(&results);
			let outcome = chain.run(&mut 0);

			let expected_len = results
				.iter()
				.position(|r| !r)
				.map_or(results.len(), |i| i + 1);
			prop_assert_eq!(outcome, results.iter().all(|r| *r));
			prop_assert_eq!(calls.lock().len(), expected_len);
		}
	}
}
