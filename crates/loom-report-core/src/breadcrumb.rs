// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Breadcrumb types (app activity leading up to an error).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Messages longer than this many characters are truncated.
pub const MAX_BREADCRUMB_MESSAGE_LEN: usize = 100;

/// A lightweight record of something that happened in the app.
///
/// Breadcrumbs are immutable once created; the only way to drop one is for it
/// to be evicted from the ring when newer crumbs arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
	pub timestamp: DateTime<Utc>,
	/// Short description, at most [`MAX_BREADCRUMB_MESSAGE_LEN`] characters.
	#[serde(rename = "name")]
	pub message: String,
	#[serde(rename = "type")]
	pub kind: BreadcrumbType,
	#[serde(rename = "metaData", default)]
	pub metadata: Map<String, Value>,
}

impl Breadcrumb {
	pub fn new(
		message: impl Into<String>,
		kind: BreadcrumbType,
		metadata: Map<String, Value>,
		timestamp: DateTime<Utc>,
	) -> Self {
		Self {
			timestamp,
			message: truncate_message(message.into()),
			kind,
			metadata,
		}
	}

	/// A manual breadcrumb. The text goes into the `message` metadata key and
	/// the crumb itself is named "manual".
	pub fn manual(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
		let mut metadata = Map::new();
		metadata.insert("message".to_string(), Value::String(message.into()));
		Self::new("manual", BreadcrumbType::Manual, metadata, timestamp)
	}
}

fn truncate_message(message: String) -> String {
	match message.char_indices().nth(MAX_BREADCRUMB_MESSAGE_LEN) {
		Some((idx, _)) => message[..idx].to_string(),
		None => message,
	}
}

/// Category of a breadcrumb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbType {
	/// An error was reported.
	Error,
	/// A log message.
	Log,
	/// Left explicitly by the host application.
	Manual,
	/// A screen or activity transition.
	Navigation,
	/// A change in process state.
	Process,
	/// A network request.
	Request,
	/// A change in app or device state (connectivity, orientation, ...).
	State,
	/// A user interaction.
	User,
}

impl BreadcrumbType {
	pub const ALL: [BreadcrumbType; 8] = [
		Self::Error,
		Self::Log,
		Self::Manual,
		Self::Navigation,
		Self::Process,
		Self::Request,
		Self::State,
		Self::User,
	];
}

impl fmt::Display for BreadcrumbType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Error => write!(f, "error"),
			Self::Log => write!(f, "log"),
			Self::Manual => write!(f, "manual"),
			Self::Navigation => write!(f, "navigation"),
			Self::Process => write!(f, "process"),
			Self::Request => write!(f, "request"),
			Self::State => write!(f, "state"),
			Self::User => write!(f, "user"),
		}
	}
}

impl FromStr for BreadcrumbType {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"error" => Ok(Self::Error),
			"log" => Ok(Self::Log),
			"manual" => Ok(Self::Manual),
			"navigation" => Ok(Self::Navigation),
			"process" => Ok(Self::Process),
			"request" => Ok(Self::Request),
			"state" => Ok(Self::State),
			"user" => Ok(Self::User),
			_ => Err(CoreError::InvalidBreadcrumbType(s.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn breadcrumb_type_roundtrip(kind in proptest::sample::select(BreadcrumbType::ALL.to_vec())) {
			let parsed: BreadcrumbType = kind.to_string().parse().unwrap();
			prop_assert_eq!(kind, parsed);
		}

		#[test]
		fn message_never_exceeds_limit(message in ".{0,300}") {
			let crumb = Breadcrumb::new(message, BreadcrumbType::Log, Map::new(), Utc::now());
			prop_assert!(crumb.message.chars().count() <= MAX_BREADCRUMB_MESSAGE_LEN);
		}
	}

	#[test]
	fn test_long_message_is_truncated_on_char_boundary() {
		let message = "é".repeat(MAX_BREADCRUMB_MESSAGE_LEN + 20);
		let crumb = Breadcrumb::new(message, BreadcrumbType::State, Map::new(), Utc::now());
		assert_eq!(crumb.message.chars().count(), MAX_BREADCRUMB_MESSAGE_LEN);
	}

	#[test]
	fn test_manual_breadcrumb_moves_text_into_metadata() {
		let crumb = Breadcrumb::manual("clicked checkout", Utc::now());
		assert_eq!(crumb.message, "manual");
		assert_eq!(crumb.kind, BreadcrumbType::Manual);
		assert_eq!(crumb.metadata["message"], "clicked checkout");
	}

	#[test]
	fn test_unknown_type_is_rejected() {
		assert!(matches!(
			"telepathy".parse::<BreadcrumbType>(),
			Err(CoreError::InvalidBreadcrumbType(_))
		));
	}
}
