// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sectioned diagnostic metadata (`section -> key -> value`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
	sections: BTreeMap<String, Map<String, Value>>,
}

impl Metadata {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets one value. A `null` value removes the key instead.
	pub fn add(&mut self, section: impl Into<String>, key: impl Into<String>, value: Value) {
		let section = section.into();
		let key = key.into();
		if value.is_null() {
			if let Some(entries) = self.sections.get_mut(&section) {
				entries.remove(&key);
				if entries.is_empty() {
					self.sections.remove(&section);
				}
			}
			return;
		}
		self.sections.entry(section).or_default().insert(key, value);
	}

	pub fn add_section(&mut self, section: impl Into<String>, values: Map<String, Value>) {
		let section = section.into();
		for (key, value) in values {
			self.add(section.clone(), key, value);
		}
	}

	pub fn clear_section(&mut self, section: &str) {
		self.sections.remove(section);
	}

	pub fn clear_key(&mut self, section: &str, key: &str) {
		self.add(section, key, Value::Null);
	}

	pub fn clear(&mut self) {
		self.sections.clear();
	}

	pub fn section(&self, section: &str) -> Option<&Map<String, Value>> {
		self.sections.get(section)
	}

	pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
		self.sections.get(section).and_then(|s| s.get(key))
	}

	pub fn is_empty(&self) -> bool {
		self.sections.is_empty()
	}

	/// Overlays `other` onto `self`; keys in `other` win.
	pub fn merge(&mut self, other: &Metadata) {
		for (section, values) in &other.sections {
			self.add_section(section.clone(), values.clone());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_null_removes_key_and_empty_section() {
		let mut metadata = Metadata::new();
		metadata.add("app", "build", json!("debug"));
		metadata.add("app", "build", Value::Null);
		assert!(metadata.get("app", "build").is_none());
		assert!(metadata.section("app").is_none());
	}

	#[test]
	fn test_merge_overrides_keys() {
		let mut base = Metadata::new();
		base.add("account", "tier", json!("free"));
		base.add("account", "id", json!(7));

		let mut overlay = Metadata::new();
		overlay.add("account", "tier", json!("pro"));

		base.merge(&overlay);
		assert_eq!(base.get("account", "tier"), Some(&json!("pro")));
		assert_eq!(base.get("account", "id"), Some(&json!(7)));
	}

	#[test]
	fn test_serializes_as_nested_object() {
		let mut metadata = Metadata::new();
		metadata.add("device", "rooted", json!(false));
		assert_eq!(
			serde_json::to_value(&metadata).unwrap(),
			json!({"device": {"rooted": false}})
		);
	}
}
