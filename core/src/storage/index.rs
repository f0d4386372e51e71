//! Secondary index data
//!
//! An index maps each index key to the set of primary keys whose records
//! produce it. Entries iterate in `(index_key, primary_key)` order.

use crate::error::{StrataError, StrataResult};
use crate::key::{Key, KeyRange};
use crate::keypath::KeyPath;
use crate::storage::{bounds_empty, next_generation};
use crate::value::Value;
use im::{OrdMap, OrdSet};
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// Index definition as persisted in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
	pub name: String,
	pub key_path: KeyPath,
	pub unique: bool,
	pub multi_entry: bool,
}

#[derive(Debug, Clone)]
pub struct IndexData {
	pub meta: IndexMeta,
	/// Identity of this index instance; recreated indexes get a new one.
	pub generation: u64,
	entries: OrdMap<Key, OrdSet<Key>>,
	len: usize,
}

impl IndexData {
	pub fn new(meta: IndexMeta) -> Self {
		Self {
			meta,
			generation: next_generation(),
			entries: OrdMap::new(),
			len: 0,
		}
	}

	/// Index keys a record value contributes. Extraction failures contribute nothing.
	pub fn keys_for(&self, value: &Value) -> Vec<Key> {
		if self.meta.multi_entry {
			self.meta.key_path.extract_multi(value)
		} else {
			self.meta.key_path.extract(value).map(|k| vec![k]).unwrap_or_default()
		}
	}

	/// Fail with `ConstraintError` if any key is already held by another record.
	pub fn check_unique(&self, keys: &[Key], primary: &Key) -> StrataResult<()> {
		if !self.meta.unique {
			return Ok(());
		}
		for key in keys {
			if let Some(primaries) = self.entries.get(key)
				&& primaries.iter().any(|p| p != primary)
			{
				return Err(StrataError::Constraint(format!(
					"index \"{}\" already contains key {key}",
					self.meta.name
				)));
			}
		}
		Ok(())
	}

	pub fn insert(&mut self, keys: &[Key], primary: &Key) {
		for key in keys {
			let mut primaries = self.entries.get(key).cloned().unwrap_or_default();
			if primaries.insert(primary.clone()).is_none() {
				self.len += 1;
			}
			self.entries.insert(key.clone(), primaries);
		}
	}

	pub fn remove(&mut self, keys: &[Key], primary: &Key) {
		for key in keys {
			let Some(mut primaries) = self.entries.get(key).cloned() else {
				continue;
			};
			if primaries.remove(primary).is_some() {
				self.len -= 1;
			}
			if primaries.is_empty() {
				self.entries.remove(key);
			} else {
				self.entries.insert(key.clone(), primaries);
			}
		}
	}

	pub fn clear(&mut self) {
		self.entries = OrdMap::new();
		self.len = 0;
	}

	/// Number of `(index_key, primary_key)` entries.
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Entries in range, in order.
	pub fn entries_in<'a>(&'a self, range: &'a KeyRange) -> impl Iterator<Item = (&'a Key, &'a Key)> + 'a {
		let keys: Box<dyn Iterator<Item = (&'a Key, &'a OrdSet<Key>)> + 'a> = if bounds_empty(range.bounds()) {
			Box::new(std::iter::empty())
		} else {
			Box::new(self.entries.range(range.bounds()))
		};
		keys.flat_map(|(key, primaries)| primaries.iter().map(move |p| (key, p)))
	}

	pub fn count(&self, range: &KeyRange) -> usize {
		if bounds_empty(range.bounds()) {
			return 0;
		}
		self.entries
			.range(range.bounds())
			.map(|(_, primaries)| primaries.len())
			.sum()
	}

	/// Smallest index key in range that also satisfies `from`.
	pub fn first_key(&self, range: &KeyRange, from: Bound<&Key>) -> Option<&Key> {
		let bounds = (tighter_lower(range.start_bound(), from), range.end_bound());
		if bounds_empty(bounds) {
			return None;
		}
		self.entries.range(bounds).next().map(|(k, _)| k)
	}

	/// Largest index key in range that also satisfies `until`.
	pub fn last_key(&self, range: &KeyRange, until: Bound<&Key>) -> Option<&Key> {
		let bounds = (range.start_bound(), tighter_upper(range.end_bound(), until));
		if bounds_empty(bounds) {
			return None;
		}
		self.entries.range(bounds).next_back().map(|(k, _)| k)
	}

	/// First primary key under `key` satisfying `from`.
	pub fn first_primary(&self, key: &Key, from: Bound<&Key>) -> Option<&Key> {
		let primaries = self.entries.get(key)?;
		primaries.range((from, Bound::Unbounded)).next()
	}

	/// Last primary key under `key` satisfying `until`.
	pub fn last_primary(&self, key: &Key, until: Bound<&Key>) -> Option<&Key> {
		let primaries = self.entries.get(key)?;
		primaries.range((Bound::Unbounded, until)).next_back()
	}
}

/// The more restrictive of two lower bounds.
pub(crate) fn tighter_lower<'a>(a: Bound<&'a Key>, b: Bound<&'a Key>) -> Bound<&'a Key> {
	match (a, b) {
		(Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
		(Bound::Included(x), Bound::Included(y)) => Bound::Included(x.max(y)),
		(Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.max(y)),
		(Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
			if i > e { Bound::Included(i) } else { Bound::Excluded(e) }
		}
	}
}

/// The more restrictive of two upper bounds.
pub(crate) fn tighter_upper<'a>(a: Bound<&'a Key>, b: Bound<&'a Key>) -> Bound<&'a Key> {
	match (a, b) {
		(Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
		(Bound::Included(x), Bound::Included(y)) => Bound::Included(x.min(y)),
		(Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.min(y)),
		(Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
			if i < e { Bound::Included(i) } else { Bound::Excluded(e) }
		}
	}
}
