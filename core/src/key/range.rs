//! Key ranges

use super::Key;
use crate::error::{StrataError, StrataResult};
use std::ops::Bound;

/// A contiguous interval of keys, each end optional and optionally open.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyRange {
	lower: Option<Key>,
	upper: Option<Key>,
	lower_open: bool,
	upper_open: bool,
}

impl KeyRange {
	/// Every key.
	pub fn all() -> Self {
		Self::default()
	}

	/// Exactly one key.
	pub fn only(key: impl Into<Key>) -> StrataResult<Self> {
		let key = key.into();
		key.validate()?;
		Ok(Self {
			lower: Some(key.clone()),
			upper: Some(key),
			lower_open: false,
			upper_open: false,
		})
	}

	pub fn lower_bound(key: impl Into<Key>, open: bool) -> StrataResult<Self> {
		let key = key.into();
		key.validate()?;
		Ok(Self {
			lower: Some(key),
			upper: None,
			lower_open: open,
			upper_open: false,
		})
	}

	pub fn upper_bound(key: impl Into<Key>, open: bool) -> StrataResult<Self> {
		let key = key.into();
		key.validate()?;
		Ok(Self {
			lower: None,
			upper: Some(key),
			lower_open: false,
			upper_open: open,
		})
	}

	/// Both ends bounded. `lower > upper` is a `DataError`, and so is
	/// `lower == upper` unless both ends are closed.
	pub fn bound(
		lower: impl Into<Key>,
		upper: impl Into<Key>,
		lower_open: bool,
		upper_open: bool,
	) -> StrataResult<Self> {
		let lower = lower.into();
		let upper = upper.into();
		lower.validate()?;
		upper.validate()?;

		match lower.cmp(&upper) {
			std::cmp::Ordering::Greater => {
				return Err(StrataError::Data(format!(
					"lower bound {lower} is greater than upper bound {upper}"
				)));
			}
			std::cmp::Ordering::Equal if lower_open || upper_open => {
				return Err(StrataError::Data(format!(
					"range on {lower} with an open end is empty"
				)));
			}
			_ => {}
		}

		Ok(Self {
			lower: Some(lower),
			upper: Some(upper),
			lower_open,
			upper_open,
		})
	}

	pub fn lower(&self) -> Option<&Key> {
		self.lower.as_ref()
	}

	pub fn upper(&self) -> Option<&Key> {
		self.upper.as_ref()
	}

	pub fn lower_open(&self) -> bool {
		self.lower_open
	}

	pub fn upper_open(&self) -> bool {
		self.upper_open
	}

	/// Whether `key` falls inside the range.
	pub fn includes(&self, key: &Key) -> bool {
		let above = match &self.lower {
			Some(lower) if self.lower_open => key > lower,
			Some(lower) => key >= lower,
			None => true,
		};
		let below = match &self.upper {
			Some(upper) if self.upper_open => key < upper,
			Some(upper) => key <= upper,
			None => true,
		};
		above && below
	}

	/// Whether the range pins down a single key.
	pub fn is_single(&self) -> bool {
		matches!((&self.lower, &self.upper), (Some(l), Some(u)) if l == u)
	}

	/// Re-check bounds of a range built from an unchecked key.
	pub(crate) fn validate(&self) -> StrataResult<()> {
		if let Some(lower) = &self.lower {
			lower.validate()?;
		}
		if let Some(upper) = &self.upper {
			upper.validate()?;
		}
		Ok(())
	}

	pub(crate) fn start_bound(&self) -> Bound<&Key> {
		match &self.lower {
			Some(lower) if self.lower_open => Bound::Excluded(lower),
			Some(lower) => Bound::Included(lower),
			None => Bound::Unbounded,
		}
	}

	pub(crate) fn end_bound(&self) -> Bound<&Key> {
		match &self.upper {
			Some(upper) if self.upper_open => Bound::Excluded(upper),
			Some(upper) => Bound::Included(upper),
			None => Bound::Unbounded,
		}
	}

	pub(crate) fn bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
		(self.start_bound(), self.end_bound())
	}
}

impl From<Key> for KeyRange {
	fn from(key: Key) -> Self {
		Self {
			lower: Some(key.clone()),
			upper: Some(key),
			lower_open: false,
			upper_open: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;

	#[test]
	fn test_bound_validation() {
		assert!(KeyRange::bound(1, 2, false, false).is_ok());
		assert!(KeyRange::bound(1, 1, false, false).is_ok());

		let err = KeyRange::bound(2, 1, false, false).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Data);

		for (lo, uo) in [(true, false), (false, true), (true, true)] {
			let err = KeyRange::bound(1, 1, lo, uo).unwrap_err();
			assert_eq!(err.kind(), ErrorKind::Data);
		}

		let err = KeyRange::only(Key::Number(f64::NAN)).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Data);
	}

	#[test]
	fn test_includes() {
		let range = KeyRange::bound(1, 5, true, false).unwrap();
		assert!(!range.includes(&Key::from(1)));
		assert!(range.includes(&Key::from(3)));
		assert!(range.includes(&Key::from(5)));
		assert!(!range.includes(&Key::from("a")));

		let upper = KeyRange::upper_bound(10, true).unwrap();
		assert!(upper.includes(&Key::from(-1000)));
		assert!(!upper.includes(&Key::from(10)));

		assert!(KeyRange::all().includes(&Key::Array(vec![])));
	}

	#[test]
	fn test_only_is_single() {
		assert!(KeyRange::only("x").unwrap().is_single());
		assert!(!KeyRange::lower_bound("x", false).unwrap().is_single());
	}
}
