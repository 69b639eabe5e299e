// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::breadcrumb::Breadcrumb;
use crate::context::{AppState, DeviceState, User};
use crate::error::CoreError;
use crate::metadata::Metadata;
use crate::session::SessionSnapshot;

/// One error report.
///
/// Built once per notify call. While on-error callbacks run the event is
/// mutable through `&mut`; after that it is only ever serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	pub errors: Vec<ErrorInfo>,
	severity: Severity,
	pub handled_state: HandledState,
	#[serde(default)]
	pub app: AppState,
	#[serde(default)]
	pub device: DeviceState,
	#[serde(default)]
	pub breadcrumbs: Vec<Breadcrumb>,
	/// The session this event counts towards, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session: Option<SessionSnapshot>,
	#[serde(default)]
	pub user: User,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub grouping_hash: Option<String>,
	#[serde(rename = "metaData", default)]
	pub metadata: Metadata,
	pub timestamp: DateTime<Utc>,
}

impl Event {
	pub fn new(error: ErrorInfo, handled_state: HandledState, timestamp: DateTime<Utc>) -> Self {
		Self {
			errors: vec![error],
			severity: handled_state.original_severity,
			handled_state,
			app: AppState::default(),
			device: DeviceState::default(),
			breadcrumbs: Vec::new(),
			session: None,
			user: User::default(),
			context: None,
			grouping_hash: None,
			metadata: Metadata::default(),
			timestamp,
		}
	}

	pub fn severity(&self) -> Severity {
		self.severity
	}

	/// Overrides the severity. Once changed from the original the reason is
	/// recorded as set by a callback.
	pub fn set_severity(&mut self, severity: Severity) {
		self.severity = severity;
		if severity != self.handled_state.original_severity {
			self.handled_state.reason = SeverityReason::UserCallbackSetSeverity;
		}
	}

	pub fn is_unhandled(&self) -> bool {
		self.handled_state.unhandled
	}

	/// True if the event has no errors, or any error class is in `ignore_classes`.
	pub fn should_ignore(&self, ignore_classes: &[String]) -> bool {
		self.errors.is_empty()
			|| self
				.errors
				.iter()
				.any(|e| ignore_classes.iter().any(|c| c == &e.error_class))
	}
}

/// A single error inside an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
	pub error_class: String,
	pub message: String,
	#[serde(default)]
	pub stacktrace: Stacktrace,
}

impl ErrorInfo {
	pub fn new(error_class: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			error_class: error_class.into(),
			message: message.into(),
			stacktrace: Stacktrace::default(),
		}
	}

	pub fn with_stacktrace(mut self, stacktrace: Stacktrace) -> Self {
		self.stacktrace = stacktrace;
		self
	}
}

/// Stack trace containing multiple frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
	pub frames: Vec<Frame>,
}

/// A single stack frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
	/// Demangled function name
	pub function: Option<String>,
	/// Crate/module path
	pub module: Option<String>,
	pub filename: Option<String>,
	pub lineno: Option<u32>,
	pub colno: Option<u32>,
	/// User code vs dependency
	pub in_app: bool,
}

/// How serious an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	Error,
	Warning,
	Info,
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Error => write!(f, "error"),
			Self::Warning => write!(f, "warning"),
			Self::Info => write!(f, "info"),
		}
	}
}

impl FromStr for Severity {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"error" => Ok(Self::Error),
			"warning" => Ok(Self::Warning),
			"info" => Ok(Self::Info),
			_ => Err(CoreError::InvalidSeverity(s.to_string())),
		}
	}
}

/// Why an event has the severity it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityReason {
	HandledException,
	UnhandledException,
	UnhandledPanic,
	Signal,
	Log,
	UserSpecifiedSeverity,
	UserCallbackSetSeverity,
}

impl SeverityReason {
	pub const ALL: [SeverityReason; 7] = [
		Self::HandledException,
		Self::UnhandledException,
		Self::UnhandledPanic,
		Self::Signal,
		Self::Log,
		Self::UserSpecifiedSeverity,
		Self::UserCallbackSetSeverity,
	];
}

impl fmt::Display for SeverityReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::HandledException => write!(f, "handled_exception"),
			Self::UnhandledException => write!(f, "unhandled_exception"),
			Self::UnhandledPanic => write!(f, "unhandled_panic"),
			Self::Signal => write!(f, "signal"),
			Self::Log => write!(f, "log"),
			Self::UserSpecifiedSeverity => write!(f, "user_specified_severity"),
			Self::UserCallbackSetSeverity => write!(f, "user_callback_set_severity"),
		}
	}
}

impl FromStr for SeverityReason {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"handled_exception" => Ok(Self::HandledException),
			"unhandled_exception" => Ok(Self::UnhandledException),
			"unhandled_panic" => Ok(Self::UnhandledPanic),
			"signal" => Ok(Self::Signal),
			"log" => Ok(Self::Log),
			"user_specified_severity" => Ok(Self::UserSpecifiedSeverity),
			"user_callback_set_severity" => Ok(Self::UserCallbackSetSeverity),
			_ => Err(CoreError::InvalidSeverityReason(s.to_string())),
		}
	}
}

/// Whether an event was handled, and the severity it started out with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandledState {
	pub reason: SeverityReason,
	pub original_severity: Severity,
	pub unhandled: bool,
	/// Extra detail for the reason (signal name, log level, ...).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub attribute_value: Option<String>,
}

impl HandledState {
	/// Default severity and handledness for a reason.
	pub fn new(reason: SeverityReason) -> Self {
		let (original_severity, unhandled) = match reason {
			SeverityReason::HandledException => (Severity::Warning, false),
			SeverityReason::UnhandledException
			| SeverityReason::UnhandledPanic
			| SeverityReason::Signal => (Severity::Error, true),
			SeverityReason::Log => (Severity::Warning, false),
			SeverityReason::UserSpecifiedSeverity | SeverityReason::UserCallbackSetSeverity => {
				(Severity::Warning, false)
			}
		};
		Self {
			reason,
			original_severity,
			unhandled,
			attribute_value: None,
		}
	}

	/// A handled event with a caller-chosen severity.
	pub fn with_severity(severity: Severity) -> Self {
		Self {
			reason: SeverityReason::UserSpecifiedSeverity,
			original_severity: severity,
			unhandled: false,
			attribute_value: None,
		}
	}

	pub fn with_attribute(mut self, value: impl Into<String>) -> Self {
		self.attribute_value = Some(value.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn severity_roundtrip(severity in prop_oneof![
			Just(Severity::Error),
			Just(Severity::Warning),
			Just(Severity::Info),
		]) {
			let parsed: Severity = severity.to_string().parse().unwrap();
			prop_assert_eq!(severity, parsed);
		}

		#[test]
		fn severity_reason_roundtrip(reason in proptest::sample::select(SeverityReason::ALL.to_vec())) {
			let parsed: SeverityReason = reason.to_string().parse().unwrap();
			prop_assert_eq!(reason, parsed);
		}
	}

	fn handled_event() -> Event {
		Event::new(
			ErrorInfo::new("std::io::Error", "disk full"),
			HandledState::new(SeverityReason::HandledException),
			Utc::now(),
		)
	}

	#[test]
	fn test_handled_defaults_to_warning() {
		let event = handled_event();
		assert_eq!(event.severity(), Severity::Warning);
		assert!(!event.is_unhandled());
	}

	#[test]
	fn test_unhandled_panic_is_error() {
		let state = HandledState::new(SeverityReason::UnhandledPanic);
		assert!(state.unhandled);
		assert_eq!(state.original_severity, Severity::Error);
	}

	#[test]
	fn test_set_severity_records_callback_reason() {
		let mut event = handled_event();
		event.set_severity(Severity::Warning);
		assert_eq!(event.handled_state.reason, SeverityReason::HandledException);

		event.set_severity(Severity::Info);
		assert_eq!(event.severity(), Severity::Info);
		assert_eq!(
			event.handled_state.reason,
			SeverityReason::UserCallbackSetSeverity
		);
	}

	#[test]
	fn test_should_ignore_matches_class() {
		let event = handled_event();
		assert!(event.should_ignore(&["std::io::Error".to_string()]));
		assert!(!event.should_ignore(&["other".to_string()]));
	}

	#[test]
	fn test_should_ignore_without_errors() {
		let mut event = handled_event();
		event.errors.clear();
		assert!(event.should_ignore(&[]));
	}

	#[test]
	fn test_event_json_keeps_severity() {
		let mut event = handled_event();
		event.set_severity(Severity::Error);
		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(json["severity"], "error");
		let back: Event = serde_json::from_value(json).unwrap();
		assert_eq!(back.severity(), Severity::Error);
	}
}
