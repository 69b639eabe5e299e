// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backtrace capture for error events.

use std::backtrace::Backtrace;

use loom_report_core::{Frame, Stacktrace};
use rustc_demangle::demangle;

/// Frames whose function starts with one of these are not app code.
const SYSTEM_PREFIXES: &[&str] = &[
	"std::",
	"core::",
	"alloc::",
	"tokio::",
	"futures::",
	"futures_util::",
	"async_trait::",
	"tracing::",
	"loom_report::",
	"panic_unwind::",
	"rust_begin_unwind",
	"rust_panic",
	"__rust_",
	"_rust_",
];

const SYSTEM_SEGMENTS: &[&str] = &["::panicking::", "::rt::", "::sys_common::", "::sys::"];

/// Captures the current stack, regardless of `RUST_BACKTRACE`.
pub fn capture_backtrace() -> Stacktrace {
	parse_backtrace(&Backtrace::force_capture())
}

pub fn parse_backtrace(backtrace: &Backtrace) -> Stacktrace {
	parse_backtrace_text(&backtrace.to_string())
}

/// Parses the `Display` form of a std backtrace:
///
/// ```text
///    3: my_app::handlers::checkout
///              at ./src/handlers.rs:42:9
/// ```
fn parse_backtrace_text(text: &str) -> Stacktrace {
	let mut frames: Vec<Frame> = Vec::new();

	for line in text.lines().map(str::trim) {
		if let Some(location) = line.strip_prefix("at ") {
			if let Some(frame) = frames.last_mut() {
				apply_location(frame, location);
			}
			continue;
		}

		let Some((index, symbol)) = line.split_once(": ") else {
			continue;
		};
		if index.trim().parse::<u32>().is_err() || symbol.is_empty() {
			continue;
		}
		frames.push(frame_for_symbol(symbol));
	}

	Stacktrace { frames }
}

fn frame_for_symbol(symbol: &str) -> Frame {
	let function = strip_hash(&demangle(symbol).to_string()).to_string();
	let trimmed = function.trim_start_matches('<');
	let module = function
		.rfind("::")
		.map(|idx| function[..idx].trim_start_matches('<').to_string());

	Frame {
		in_app: is_in_app(trimmed),
		module,
		function: Some(function),
		..Default::default()
	}
}

/// Drops the trailing `::h0123456789abcdef` legacy mangling hash.
fn strip_hash(function: &str) -> &str {
	match function.rsplit_once("::h") {
		Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => head,
		_ => function,
	}
}

/// `path:line:col`; line and column are optional.
fn apply_location(frame: &mut Frame, location: &str) {
	let mut parts = location.rsplitn(3, ':');
	let last = parts.next();
	let middle = parts.next();
	let rest = parts.next();

	match (rest, middle, last) {
		(Some(file), Some(line), Some(col)) if line.parse::<u32>().is_ok() => {
			frame.filename = Some(file.to_string());
			frame.lineno = line.parse().ok();
			frame.colno = col.parse().ok();
		}
		(_, Some(file), Some(line)) if line.parse::<u32>().is_ok() => {
			frame.filename = Some(match rest {
				Some(prefix) => format!("{prefix}:{file}"),
				None => file.to_string(),
			});
			frame.lineno = line.parse().ok();
		}
		_ => frame.filename = Some(location.to_string()),
	}
}

fn is_in_app(function: &str) -> bool {
	!SYSTEM_PREFIXES.iter().any(|p| function.starts_with(p))
		&& !SYSTEM_SEGMENTS.iter().any(|s| function.contains(s))
}
