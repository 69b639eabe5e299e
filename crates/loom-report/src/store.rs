// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable on-disk queue of undelivered events and sessions.
//!
//! One JSON file per record. Files are named `{stamp:020}_{uuid}.json` where
//! the stamp is strictly increasing, so lexical order is write order. Writes go
//! to a `.tmp-` file in the same directory, are synced, then renamed into
//! place; enumeration ignores anything that is not a finalized record.
//!
//! Flushes `claim` records before reading them. A claimed record is invisible
//! to other claims and to retention until it is deleted or cancelled.

use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use loom_report_core::PayloadKind;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{ReportError, Result};

const RECORD_VERSION: u32 = 1;
const RECORD_SUFFIX: &str = ".json";
const TMP_PREFIX: &str = ".tmp-";

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
	version: u32,
	kind: PayloadKind,
	item: T,
}

/// Handle to one finalized record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoredRecord {
	name: String,
	path: PathBuf,
}

impl StoredRecord {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

pub struct FileStore<T> {
	dir: PathBuf,
	kind: PayloadKind,
	max_records: usize,
	reserved: Mutex<HashSet<String>>,
	last_stamp: AtomicU64,
	_item: PhantomData<fn() -> T>,
}

impl<T> FileStore<T>
where
	T: Serialize + DeserializeOwned,
{
	/// Opens (creating if needed) a store rooted at `dir`. Leftover temp files
	/// from an interrupted write are removed.
	pub fn open(dir: impl Into<PathBuf>, kind: PayloadKind, max_records: usize) -> Result<Self> {
		let dir = dir.into();
		fs::create_dir_all(&dir)?;

		let mut last_stamp = 0;
		for entry in fs::read_dir(&dir)? {
			let entry = entry?;
			let name = entry.file_name().to_string_lossy().into_owned();
			if name.starts_with(TMP_PREFIX) {
				debug!(file = %name, "Removing interrupted write");
				if let Err(e) = fs::remove_file(entry.path()) {
					warn!(file = %name, error = %e, "Failed to remove temp file");
				}
			} else if let Some(stamp) = parse_stamp(&name) {
				last_stamp = last_stamp.max(stamp);
			}
		}

		Ok(Self {
			dir,
			kind,
			max_records,
			reserved: Mutex::new(HashSet::new()),
			last_stamp: AtomicU64::new(last_stamp),
			_item: PhantomData,
		})
	}

	/// Durably writes one item, then prunes the oldest unclaimed records if
	/// the store is over its limit.
	pub fn write(&self, item: &T) -> Result<StoredRecord> {
		let bytes = serde_json::to_vec(&Envelope {
			version: RECORD_VERSION,
			kind: self.kind,
			item,
		})?;

		let name = format!("{:020}_{}{}", self.next_stamp(), Uuid::new_v4().simple(), RECORD_SUFFIX);
		let path = self.dir.join(&name);

		let mut tmp = tempfile::Builder::new()
			.prefix(TMP_PREFIX)
			.suffix(RECORD_SUFFIX)
			.tempfile_in(&self.dir)?;
		tmp.write_all(&bytes)?;
		tmp.as_file().sync_all()?;
		tmp.persist(&path).map_err(|e| e.error)?;

		debug!(kind = %self.kind, record = %name, bytes = bytes.len(), "Record stored");
		self.enforce_limit();
		Ok(StoredRecord { name, path })
	}

	/// All finalized records, oldest first. Claimed records are included.
	pub fn enumerate(&self) -> Result<Vec<StoredRecord>> {
		let mut records = Vec::new();
		for entry in fs::read_dir(&self.dir)? {
			let entry = entry?;
			let name = entry.file_name().to_string_lossy().into_owned();
			if is_record_name(&name) {
				records.push(StoredRecord {
					path: entry.path(),
					name,
				});
			}
		}
		records.sort();
		Ok(records)
	}

	/// Enumerates and reserves every unclaimed record in one step.
	pub fn claim(&self) -> Result<Vec<StoredRecord>> {
		let mut reserved = self.reserved.lock();
		let records: Vec<StoredRecord> = self
			.enumerate()?
			.into_iter()
			.filter(|record| !reserved.contains(&record.name))
			.collect();
		for record in &records {
			reserved.insert(record.name.clone());
		}
		Ok(records)
	}

	pub fn read(&self, record: &StoredRecord) -> Result<T> {
		let bytes = fs::read(&record.path)?;
		let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
		if envelope.version != RECORD_VERSION {
			return Err(ReportError::CorruptRecord {
				name: record.name.clone(),
				reason: format!("unsupported version {}", envelope.version),
			});
		}
		if envelope.kind != self.kind {
			return Err(ReportError::CorruptRecord {
				name: record.name.clone(),
				reason: format!("expected {} record, found {}", self.kind, envelope.kind),
			});
		}
		Ok(envelope.item)
	}

	/// Removes records and releases their claims. Missing files are ignored.
	pub fn delete(&self, records: &[StoredRecord]) {
		let mut reserved = self.reserved.lock();
		for record in records {
			match fs::remove_file(&record.path) {
				Ok(()) => debug!(kind = %self.kind, record = %record.name, "Record deleted"),
				Err(e) if e.kind() == ErrorKind::NotFound => {}
				Err(e) => error!(kind = %self.kind, record = %record.name, error = %e, "Failed to delete record"),
			}
			reserved.remove(&record.name);
		}
	}

	/// Releases claims without deleting, leaving the records for a later flush.
	pub fn cancel(&self, records: &[StoredRecord]) {
		let mut reserved = self.reserved.lock();
		for record in records {
			reserved.remove(&record.name);
		}
	}

	pub fn len(&self) -> usize {
		self.enumerate().map(|records| records.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn next_stamp(&self) -> u64 {
		let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
		let previous = self
			.last_stamp
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
				Some(now.max(last.saturating_add(1)))
			})
			.unwrap_or(now);
		now.max(previous.saturating_add(1))
	}

	fn enforce_limit(&self) {
		let reserved = self.reserved.lock();
		let records = match self.enumerate() {
			Ok(records) => records,
			Err(e) => {
				error!(kind = %self.kind, error = %e, "Failed to enumerate store for retention");
				return;
			}
		};
		if records.len() <= self.max_records {
			return;
		}

		let mut excess = records.len() - self.max_records;
		for record in records.iter().filter(|r| !reserved.contains(&r.name)) {
			if excess == 0 {
				break;
			}
			warn!(kind = %self.kind, record = %record.name, "Store full; dropping oldest record");
			if let Err(e) = fs::remove_file(&record.path) {
				if e.kind() != ErrorKind::NotFound {
					error!(kind = %self.kind, record = %record.name, error = %e, "Failed to prune record");
					continue;
				}
			}
			excess -= 1;
		}
	}
}

impl<T> std::fmt::Debug for FileStore<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FileStore")
			.field("dir", &self.dir)
			.field("kind", &self.kind)
			.field("max_records", &self.max_records)
			.finish()
	}
}

fn is_record_name(name: &str) -> bool {
	!name.starts_with('.') && name.ends_with(RECORD_SUFFIX) && parse_stamp(name).is_some()
}

fn parse_stamp(name: &str) -> Option<u64> {
	let (stamp, _) = name.split_once('_')?;
	stamp.parse().ok()
}
