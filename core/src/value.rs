//! Record values
//!
//! Records hold arbitrary nested documents. The engine never interprets a
//! value beyond key-path extraction, so a small tagged tree is enough.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A document stored in an object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Number(f64),
	String(String),
	Binary(Vec<u8>),
	/// Milliseconds since the Unix epoch.
	Date(f64),
	Array(Vec<Value>),
	Object(BTreeMap<String, Value>),
}

impl Value {
	/// Empty object.
	pub fn object() -> Self {
		Value::Object(BTreeMap::new())
	}

	pub fn is_object(&self) -> bool {
		matches!(self, Value::Object(_))
	}

	pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
		match self {
			Value::Object(map) => Some(map),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			_ => None,
		}
	}

	/// Member lookup on an object value.
	pub fn get(&self, field: &str) -> Option<&Value> {
		self.as_object().and_then(|map| map.get(field))
	}

	/// Follow a sequence of member names.
	pub fn get_path(&self, segments: &[&str]) -> Option<&Value> {
		segments
			.iter()
			.try_fold(self, |current, segment| current.get(segment))
	}

	/// Date value as a chrono timestamp, if it fits.
	pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
		match self {
			Value::Date(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64),
			_ => None,
		}
	}

	/// Lossy conversion to JSON; binary becomes an array of bytes, dates become milliseconds.
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Value::Null => serde_json::Value::Null,
			Value::Bool(b) => serde_json::Value::Bool(*b),
			Value::Number(n) | Value::Date(n) => serde_json::Number::from_f64(*n)
				.map(serde_json::Value::Number)
				.unwrap_or(serde_json::Value::Null),
			Value::String(s) => serde_json::Value::String(s.clone()),
			Value::Binary(bytes) => serde_json::Value::Array(
				bytes
					.iter()
					.map(|b| serde_json::Value::from(*b))
					.collect(),
			),
			Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
			Value::Object(map) => serde_json::Value::Object(
				map.iter()
					.map(|(k, v)| (k.clone(), v.to_json()))
					.collect(),
			),
		}
	}
}

impl From<serde_json::Value> for Value {
	fn from(json: serde_json::Value) -> Self {
		match json {
			serde_json::Value::Null => Value::Null,
			serde_json::Value::Bool(b) => Value::Bool(b),
			serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
			serde_json::Value::String(s) => Value::String(s),
			serde_json::Value::Array(items) => {
				Value::Array(items.into_iter().map(Value::from).collect())
			}
			serde_json::Value::Object(map) => {
				Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
			}
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Self {
		Value::Number(n)
	}
}

impl From<i32> for Value {
	fn from(n: i32) -> Self {
		Value::Number(n as f64)
	}
}

impl From<i64> for Value {
	fn from(n: i64) -> Self {
		Value::Number(n as f64)
	}
}

impl From<u64> for Value {
	fn from(n: u64) -> Self {
		Value::Number(n as f64)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Value::String(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Value::String(s)
	}
}

impl From<Vec<u8>> for Value {
	fn from(bytes: Vec<u8>) -> Self {
		Value::Binary(bytes)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Value::Array(items)
	}
}

impl From<DateTime<Utc>> for Value {
	fn from(ts: DateTime<Utc>) -> Self {
		Value::Date(ts.timestamp_millis() as f64)
	}
}
