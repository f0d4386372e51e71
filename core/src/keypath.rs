//! Key paths
//!
//! A key path names where a key lives inside a record value. Paths are
//! validated once, when the store or index that owns them is created.

use crate::error::{StrataError, StrataResult};
use crate::key::Key;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dotted member path, or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPath {
	/// `""` selects the whole value.
	Single(String),
	Compound(Vec<String>),
}

/// Why a key path did not yield a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionFailure {
	/// The path does not resolve to anything.
	Missing,
	/// The path resolves to a value that is not a valid key.
	Invalid,
}

impl KeyPath {
	pub fn compound<I, S>(paths: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		KeyPath::Compound(paths.into_iter().map(Into::into).collect())
	}

	pub fn is_compound(&self) -> bool {
		matches!(self, KeyPath::Compound(_))
	}

	/// True for the `""` path.
	pub fn is_empty_path(&self) -> bool {
		matches!(self, KeyPath::Single(path) if path.is_empty())
	}

	/// Check every segment is an identifier. Fails with `SyntaxError`.
	pub fn validate(&self) -> StrataResult<()> {
		match self {
			KeyPath::Single(path) => validate_path(path),
			KeyPath::Compound(paths) if paths.is_empty() => Err(StrataError::Syntax(
				"compound key path must not be empty".into(),
			)),
			KeyPath::Compound(paths) => paths.iter().try_for_each(|p| validate_path(p)),
		}
	}

	/// Evaluate the path against a value.
	pub fn extract(&self, value: &Value) -> Result<Key, ExtractionFailure> {
		match self {
			KeyPath::Single(path) => extract_single(path, value),
			KeyPath::Compound(paths) => paths
				.iter()
				.map(|p| extract_single(p, value))
				.collect::<Result<Vec<_>, _>>()
				.map(Key::Array),
		}
	}

	/// Index keys for a multi-entry index: the valid, de-duplicated elements
	/// when the path yields an array, otherwise at most one key.
	pub fn extract_multi(&self, value: &Value) -> Vec<Key> {
		let resolved = match self {
			KeyPath::Single(path) => resolve(path, value),
			KeyPath::Compound(_) => None,
		};
		match resolved {
			Some(Value::Array(items)) => {
				let mut keys: Vec<Key> = items
					.iter()
					.filter_map(|item| Key::from_value(item).ok())
					.collect();
				keys.sort();
				keys.dedup();
				keys
			}
			_ => self.extract(value).map(|k| vec![k]).unwrap_or_default(),
		}
	}

	/// Whether [`KeyPath::inject`] would succeed on `value`.
	pub fn can_inject(&self, value: &Value) -> bool {
		let KeyPath::Single(path) = self else {
			return false;
		};
		if path.is_empty() {
			return false;
		}
		let segments: Vec<&str> = path.split('.').collect();
		let mut current = value;
		for segment in &segments[..segments.len() - 1] {
			match current {
				Value::Object(map) => match map.get(*segment) {
					Some(next) => current = next,
					None => return true,
				},
				_ => return false,
			}
		}
		current.is_object()
	}

	/// Write a generated key into `value`, creating missing intermediate objects.
	pub fn inject(&self, value: &mut Value, key: &Key) -> StrataResult<()> {
		if !self.can_inject(value) {
			return Err(StrataError::Data(format!(
				"cannot store generated key at key path {self}"
			)));
		}
		let KeyPath::Single(path) = self else {
			return Err(StrataError::Data("compound key paths cannot hold generated keys".into()));
		};

		let segments: Vec<&str> = path.split('.').collect();
		let (last, parents) = segments
			.split_last()
			.ok_or_else(|| StrataError::Data("empty key path".into()))?;
		let mut current = value;
		for segment in parents {
			let Value::Object(map) = current else {
				return Err(StrataError::Data(format!("{segment} is not an object")));
			};
			current = map.entry(segment.to_string()).or_insert_with(Value::object);
		}
		match current {
			Value::Object(map) => {
				map.insert(last.to_string(), key.to_value());
				Ok(())
			}
			_ => Err(StrataError::Data(format!("{last} parent is not an object"))),
		}
	}
}

fn validate_path(path: &str) -> StrataResult<()> {
	if path.is_empty() {
		return Ok(());
	}
	for segment in path.split('.') {
		if !is_identifier(segment) {
			return Err(StrataError::Syntax(format!("invalid key path \"{path}\"")));
		}
	}
	Ok(())
}

fn is_identifier(segment: &str) -> bool {
	let mut chars = segment.chars();
	match chars.next() {
		Some(c) if c.is_alphabetic() || c == '$' || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_alphanumeric() || c == '$' || c == '_')
}

fn resolve<'a>(path: &str, value: &'a Value) -> Option<&'a Value> {
	if path.is_empty() {
		return Some(value);
	}
	path.split('.')
		.try_fold(value, |current, segment| current.get(segment))
}

fn extract_single(path: &str, value: &Value) -> Result<Key, ExtractionFailure> {
	let resolved = resolve(path, value).ok_or(ExtractionFailure::Missing)?;
	Key::from_value(resolved).map_err(|_| ExtractionFailure::Invalid)
}

impl fmt::Display for KeyPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			KeyPath::Single(path) => write!(f, "{path:?}"),
			KeyPath::Compound(paths) => write!(f, "{paths:?}"),
		}
	}
}

impl From<&str> for KeyPath {
	fn from(path: &str) -> Self {
		KeyPath::Single(path.to_string())
	}
}

impl From<String> for KeyPath {
	fn from(path: String) -> Self {
		KeyPath::Single(path)
	}
}

impl From<Vec<&str>> for KeyPath {
	fn from(paths: Vec<&str>) -> Self {
		KeyPath::compound(paths)
	}
}

impl<const N: usize> From<[&str; N]> for KeyPath {
	fn from(paths: [&str; N]) -> Self {
		KeyPath::compound(paths)
	}
}
