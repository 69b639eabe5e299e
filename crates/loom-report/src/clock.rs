// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Injectable wall clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to. Millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
	millis: AtomicI64,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			millis: AtomicI64::new(start.timestamp_millis()),
		}
	}

	pub fn advance(&self, by: Duration) {
		let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
		self.millis.fetch_add(by, Ordering::SeqCst);
	}

	pub fn set(&self, to: DateTime<Utc>) {
		self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new(Utc::now())
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		let millis = self.millis.load(Ordering::SeqCst);
		Utc.timestamp_millis_opt(millis)
			.single()
			.unwrap_or(DateTime::<Utc>::MIN_UTC)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_manual_clock_advances() {
		let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
		let clock = ManualClock::new(start);
		clock.advance(Duration::from_secs(31));
		assert_eq!((clock.now() - start).num_milliseconds(), 31_000);
	}

	#[test]
	fn test_manual_clock_set() {
		let clock = ManualClock::default();
		let target = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();
		clock.set(target);
		assert_eq!(clock.now(), target);
	}
}
