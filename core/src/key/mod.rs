//! Keys and key ordering
//!
//! A [`Key`] is the ordered subset of [`Value`]: numbers, dates, strings,
//! binary blobs and arrays of keys. Keys of different classes order by class
//! rank (number < date < string < binary < array), then by value.

pub mod codec;
pub mod range;

use crate::error::{StrataError, StrataResult};
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

pub use codec::{decode_key, encode_key};
pub use range::KeyRange;

/// A primary or index key.
///
/// Construct keys through [`Key::from_value`] or the `From` impls. Variants
/// are public for pattern matching; a hand-built key holding `NaN` or a
/// non-finite date is rejected by every engine operation with `DataError`.
#[derive(Debug, Clone)]
pub enum Key {
	Number(f64),
	/// Milliseconds since the Unix epoch.
	Date(f64),
	String(String),
	Binary(Vec<u8>),
	Array(Vec<Key>),
}

impl Key {
	/// Number key with `-0` folded into `0`.
	pub fn number(n: f64) -> Self {
		Key::Number(normalize_zero(n))
	}

	pub fn date(ms: f64) -> Self {
		Key::Date(normalize_zero(ms))
	}

	pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
		Key::Binary(bytes.into())
	}

	/// Convert a value into a key, checking validity through nested arrays.
	pub fn from_value(value: &Value) -> StrataResult<Key> {
		match value {
			Value::Number(n) if n.is_nan() => Err(StrataError::Data("NaN is not a valid key".into())),
			Value::Number(n) => Ok(Key::number(*n)),
			Value::Date(ms) if !ms.is_finite() => {
				Err(StrataError::Data("invalid date is not a valid key".into()))
			}
			Value::Date(ms) => Ok(Key::date(*ms)),
			Value::String(s) => Ok(Key::String(s.clone())),
			Value::Binary(bytes) => Ok(Key::Binary(bytes.clone())),
			Value::Array(items) => items
				.iter()
				.map(Key::from_value)
				.collect::<StrataResult<Vec<_>>>()
				.map(Key::Array),
			Value::Null => Err(StrataError::Data("null is not a valid key".into())),
			Value::Bool(_) => Err(StrataError::Data("booleans are not valid keys".into())),
			Value::Object(_) => Err(StrataError::Data("objects are not valid keys".into())),
		}
	}

	/// Reject keys that could not have come from [`Key::from_value`].
	pub fn validate(&self) -> StrataResult<()> {
		match self {
			Key::Number(n) if n.is_nan() => Err(StrataError::Data("NaN is not a valid key".into())),
			Key::Date(ms) if !ms.is_finite() => {
				Err(StrataError::Data("invalid date is not a valid key".into()))
			}
			Key::Array(items) => items.iter().try_for_each(Key::validate),
			_ => Ok(()),
		}
	}

	/// The value a key reads back as.
	pub fn to_value(&self) -> Value {
		match self {
			Key::Number(n) => Value::Number(*n),
			Key::Date(ms) => Value::Date(*ms),
			Key::String(s) => Value::String(s.clone()),
			Key::Binary(bytes) => Value::Binary(bytes.clone()),
			Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
		}
	}

	/// Numeric value usable by a key generator.
	pub fn as_number(&self) -> Option<f64> {
		match self {
			Key::Number(n) => Some(*n),
			_ => None,
		}
	}

	fn rank(&self) -> u8 {
		match self {
			Key::Number(_) => 1,
			Key::Date(_) => 2,
			Key::String(_) => 3,
			Key::Binary(_) => 4,
			Key::Array(_) => 5,
		}
	}
}

fn normalize_zero(n: f64) -> f64 {
	if n == 0.0 { 0.0 } else { n }
}

fn compare_f64(a: f64, b: f64) -> Ordering {
	if a < b {
		Ordering::Less
	} else if a > b {
		Ordering::Greater
	} else {
		Ordering::Equal
	}
}

impl Ord for Key {
	fn cmp(&self, other: &Self) -> Ordering {
		match (self, other) {
			(Key::Number(a), Key::Number(b)) | (Key::Date(a), Key::Date(b)) => compare_f64(*a, *b),
			// UTF-16 code unit order, not scalar value order
			(Key::String(a), Key::String(b)) => a.encode_utf16().cmp(b.encode_utf16()),
			(Key::Binary(a), Key::Binary(b)) => a.cmp(b),
			(Key::Array(a), Key::Array(b)) => a.cmp(b),
			_ => self.rank().cmp(&other.rank()),
		}
	}
}

impl PartialOrd for Key {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for Key {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for Key {}

/// Compare two keys after validating both.
pub fn compare_keys(a: &Key, b: &Key) -> StrataResult<Ordering> {
	a.validate()?;
	b.validate()?;
	Ok(a.cmp(b))
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Key::Number(n) => write!(f, "{n}"),
			Key::Date(ms) => write!(f, "Date({ms})"),
			Key::String(s) => write!(f, "{s:?}"),
			Key::Binary(bytes) => write!(f, "0x{}", hex::encode(bytes)),
			Key::Array(items) => {
				write!(f, "[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{item}")?;
				}
				write!(f, "]")
			}
		}
	}
}

impl TryFrom<Value> for Key {
	type Error = StrataError;

	fn try_from(value: Value) -> StrataResult<Key> {
		Key::from_value(&value)
	}
}

impl From<f64> for Key {
	fn from(n: f64) -> Self {
		Key::number(n)
	}
}

impl From<i32> for Key {
	fn from(n: i32) -> Self {
		Key::Number(n as f64)
	}
}

impl From<i64> for Key {
	fn from(n: i64) -> Self {
		Key::Number(n as f64)
	}
}

impl From<u64> for Key {
	fn from(n: u64) -> Self {
		Key::Number(n as f64)
	}
}

impl From<&str> for Key {
	fn from(s: &str) -> Self {
		Key::String(s.to_string())
	}
}

impl From<String> for Key {
	fn from(s: String) -> Self {
		Key::String(s)
	}
}

impl From<Vec<Key>> for Key {
	fn from(items: Vec<Key>) -> Self {
		Key::Array(items)
	}
}
