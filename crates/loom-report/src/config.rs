// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use loom_report_core::BreadcrumbType;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Hard ceiling for the breadcrumb ring.
pub const MAX_BREADCRUMBS_LIMIT: usize = 100;

/// Collector endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
	pub notify: String,
	pub sessions: String,
}

impl Default for Endpoints {
	fn default() -> Self {
		Self {
			notify: "https://notify.loom.dev".to_string(),
			sessions: "https://sessions.loom.dev".to_string(),
		}
	}
}

/// Configuration for a [`ReportClient`](crate::ReportClient).
///
/// Deserializable so a host can embed it in its own config file; every field
/// except `api_key` and `storage_dir` has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
	pub api_key: String,
	pub endpoints: Endpoints,
	pub release_stage: String,
	/// Stages that report. `None` means every stage does.
	pub enabled_release_stages: Option<HashSet<String>>,
	pub app_version: Option<String>,
	pub auto_track_sessions: bool,
	/// How long the app must stay in the background before coming back to the
	/// foreground starts a new session.
	#[serde(with = "duration_ms")]
	pub session_timeout: Duration,
	pub max_breadcrumbs: usize,
	/// Breadcrumb types that are recorded. `None` means all of them.
	pub enabled_breadcrumb_types: Option<HashSet<BreadcrumbType>>,
	pub max_persisted_events: usize,
	pub max_persisted_sessions: usize,
	pub storage_dir: PathBuf,
	pub worker_threads: usize,
	pub queue_capacity: usize,
	#[serde(with = "duration_ms")]
	pub request_timeout: Duration,
	/// Error classes that are never reported.
	pub ignore_classes: Vec<String>,
}

impl Default for ReportConfig {
	fn default() -> Self {
		Self {
			api_key: String::new(),
			endpoints: Endpoints::default(),
			release_stage: "production".to_string(),
			enabled_release_stages: None,
			app_version: None,
			auto_track_sessions: true,
			session_timeout: Duration::from_secs(30),
			max_breadcrumbs: 25,
			enabled_breadcrumb_types: None,
			max_persisted_events: 32,
			max_persisted_sessions: 128,
			storage_dir: PathBuf::new(),
			worker_threads: 2,
			queue_capacity: 128,
			request_timeout: Duration::from_secs(30),
			ignore_classes: Vec::new(),
		}
	}
}

impl ReportConfig {
	/// Checks required fields and clamps the breadcrumb limit.
	pub fn validate(mut self) -> Result<Self> {
		if self.api_key.is_empty() {
			return Err(ReportError::MissingApiKey);
		}
		if !is_valid_api_key(&self.api_key) {
			return Err(ReportError::InvalidConfig(
				"api_key must be 32 hexadecimal characters".to_string(),
			));
		}
		if self.storage_dir.as_os_str().is_empty() {
			return Err(ReportError::MissingStorageDir);
		}
		if self.endpoints.notify.is_empty() || self.endpoints.sessions.is_empty() {
			return Err(ReportError::InvalidConfig(
				"endpoints must not be empty".to_string(),
			));
		}
		if self.worker_threads == 0 {
			return Err(ReportError::InvalidConfig(
				"worker_threads must be at least 1".to_string(),
			));
		}
		if self.queue_capacity == 0 {
			return Err(ReportError::InvalidConfig(
				"queue_capacity must be at least 1".to_string(),
			));
		}
		if self.max_persisted_events == 0 || self.max_persisted_sessions == 0 {
			return Err(ReportError::InvalidConfig(
				"max_persisted_events and max_persisted_sessions must be at least 1".to_string(),
			));
		}
		self.max_breadcrumbs = self.max_breadcrumbs.min(MAX_BREADCRUMBS_LIMIT);
		Ok(self)
	}

	pub fn release_stage_enabled(&self) -> bool {
		self
			.enabled_release_stages
			.as_ref()
			.map_or(true, |stages| stages.contains(&self.release_stage))
	}

	pub fn breadcrumb_type_enabled(&self, kind: BreadcrumbType) -> bool {
		self
			.enabled_breadcrumb_types
			.as_ref()
			.map_or(true, |types| types.contains(&kind))
	}
}

fn is_valid_api_key(key: &str) -> bool {
	key.len() == 32 && key.chars().all(|c| c.is_ascii_hexdigit())
}

mod duration_ms {
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		u64::try_from(duration.as_millis())
			.unwrap_or(u64::MAX)
			.serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let millis = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(millis))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	const KEY: &str = "0123456789abcdef0123456789abcdef";

	fn valid() -> ReportConfig {
		ReportConfig {
			api_key: KEY.to_string(),
			storage_dir: PathBuf::from("/tmp/loom-report"),
			..Default::default()
		}
	}

	#[test]
	fn test_defaults() {
		let config = ReportConfig::default();
		assert_eq!(config.session_timeout, Duration::from_millis(30_000));
		assert_eq!(config.max_breadcrumbs, 25);
		assert!(config.auto_track_sessions);
		assert_eq!(config.release_stage, "production");
	}

	#[test]
	fn test_missing_api_key() {
		let config = ReportConfig {
			api_key: String::new(),
			..valid()
		};
		assert!(matches!(config.validate(), Err(ReportError::MissingApiKey)));
	}

	#[test]
	fn test_malformed_api_key() {
		let config = ReportConfig {
			api_key: "not-a-key".to_string(),
			..valid()
		};
		assert!(matches!(
			config.validate(),
			Err(ReportError::InvalidConfig(_))
		));
	}

	#[test]
	fn test_missing_storage_dir() {
		let config = ReportConfig {
			storage_dir: PathBuf::new(),
			..valid()
		};
		assert!(matches!(
			config.validate(),
			Err(ReportError::MissingStorageDir)
		));
	}

	#[test]
	fn test_zero_persistence_limits_are_rejected() {
		for config in [
			ReportConfig {
				max_persisted_events: 0,
				..valid()
			},
			ReportConfig {
				max_persisted_sessions: 0,
				..valid()
			},
		] {
			assert!(matches!(
				config.validate(),
				Err(ReportError::InvalidConfig(_))
			));
		}
	}

	#[test]
	fn test_release_stage_filter() {
		let mut config = valid();
		assert!(config.release_stage_enabled());

		config.enabled_release_stages = Some(["staging".to_string()].into_iter().collect());
		assert!(!config.release_stage_enabled());

		config.release_stage = "staging".to_string();
		assert!(config.release_stage_enabled());
	}

	#[test]
	fn test_deserialize_partial_json() {
		let json = serde_json::json!({
			"api_key": KEY,
			"storage_dir": "/var/lib/app/reports",
			"session_timeout": 5000,
			"enabled_breadcrumb_types": ["navigation", "manual"],
		});
		let config: ReportConfig = serde_json::from_value(json).unwrap();
		let config = config.validate().unwrap();
		assert_eq!(config.session_timeout, Duration::from_secs(5));
		assert!(config.breadcrumb_type_enabled(BreadcrumbType::Manual));
		assert!(!config.breadcrumb_type_enabled(BreadcrumbType::Log));
		assert_eq!(config.endpoints, Endpoints::default());
	}

	proptest! {
		#[test]
		fn max_breadcrumbs_is_clamped(max in 0usize..10_000) {
			let config = ReportConfig { max_breadcrumbs: max, ..valid() }.validate().unwrap();
			prop_assert!(config.max_breadcrumbs <= MAX_BREADCRUMBS_LIMIT);
			prop_assert_eq!(config.max_breadcrumbs, max.min(MAX_BREADCRUMBS_LIMIT));
		}
	}
}
