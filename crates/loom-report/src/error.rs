// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the reporting client.
//!
//! Only construction and storage I/O surface these. Reporting entry points on
//! the client never return them; failures there become log lines.

use thiserror::Error;

/// Result type alias for reporting client operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Errors that can occur in the reporting client.
#[derive(Debug, Error)]
pub enum ReportError {
	/// API key is missing.
	#[error("API key is required")]
	MissingApiKey,

	/// Storage directory is missing.
	#[error("storage directory is required")]
	MissingStorageDir,

	/// Configuration failed validation.
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	/// The background runtime could not be created.
	#[error("failed to build background runtime: {0}")]
	RuntimeBuild(String),

	/// The client has been shut down.
	#[error("report client has been shut down")]
	ClientShutdown,

	/// HTTP client construction failed.
	#[error("HTTP client error: {0}")]
	Http(#[from] reqwest::Error),

	/// Filesystem error in the persistent store.
	#[error("storage I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// A record could not be encoded or decoded.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// A stored record had the wrong kind or version.
	#[error("corrupt record {name}: {reason}")]
	CorruptRecord { name: String, reason: String },
}
