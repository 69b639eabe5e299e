// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the reporting data model.

use thiserror::Error;

/// Errors that can occur while parsing or encoding report types.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error("invalid breadcrumb type: {0}")]
	InvalidBreadcrumbType(String),

	#[error("invalid severity: {0}")]
	InvalidSeverity(String),

	#[error("invalid severity reason: {0}")]
	InvalidSeverityReason(String),

	#[error("invalid payload kind: {0}")]
	InvalidPayloadKind(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type for report data model operations.
pub type Result<T> = std::result::Result<T, CoreError>;
