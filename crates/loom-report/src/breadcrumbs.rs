// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded ring of recent breadcrumbs.

use std::collections::VecDeque;
use std::sync::Arc;

use loom_report_core::Breadcrumb;
use parking_lot::RwLock;

use crate::observer::{ObserverBus, StateEvent};

/// A thread-safe ring that keeps the most recent `capacity` breadcrumbs.
///
/// When full, the oldest crumb is evicted. A capacity of zero disables
/// recording entirely.
pub struct BreadcrumbRing {
	entries: RwLock<VecDeque<Breadcrumb>>,
	capacity: usize,
	observers: Arc<ObserverBus>,
}

impl BreadcrumbRing {
	pub fn new(capacity: usize, observers: Arc<ObserverBus>) -> Self {
		Self {
			entries: RwLock::new(VecDeque::with_capacity(capacity)),
			capacity,
			observers,
		}
	}

	pub fn add(&self, breadcrumb: Breadcrumb) {
		if self.capacity == 0 {
			return;
		}

		{
			let mut entries = self.entries.write();
			entries.push_back(breadcrumb.clone());
			while entries.len() > self.capacity {
				entries.pop_front();
			}
		}

		self.observers.notify(StateEvent::BreadcrumbAdded(breadcrumb));
	}

	/// Oldest to newest.
	pub fn snapshot(&self) -> Vec<Breadcrumb> {
		self.entries.read().iter().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
