//! Object store data
//!
//! A store holds records ordered by primary key, its indexes, and the key
//! generator. All maps are persistent (`im`), so cloning a store for a
//! transaction's working copy is cheap and rollback is just dropping it.

use crate::error::{StrataError, StrataResult};
use crate::key::{Key, KeyRange};
use crate::keypath::{ExtractionFailure, KeyPath};
use crate::storage::index::{IndexData, IndexMeta, tighter_lower, tighter_upper};
use crate::storage::{bounds_empty, next_generation};
use crate::value::Value;
use im::OrdMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Largest integer a key generator hands out.
pub const MAX_GENERATED_KEY: u64 = 1 << 53;

/// Object store definition as persisted in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
	pub name: String,
	pub key_path: Option<KeyPath>,
	pub auto_increment: bool,
}

#[derive(Debug, Clone)]
pub struct StoreData {
	pub meta: StoreMeta,
	/// Identity of this store instance; recreated stores get a new one.
	pub generation: u64,
	records: OrdMap<Key, Value>,
	indexes: BTreeMap<String, IndexData>,
	next_key: u64,
}

/// How a write treats an existing record under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
	/// Fail with `ConstraintError`.
	Add,
	/// Replace it.
	Put,
}

impl StoreData {
	pub fn new(meta: StoreMeta) -> Self {
		Self {
			meta,
			generation: next_generation(),
			records: OrdMap::new(),
			indexes: BTreeMap::new(),
			next_key: 1,
		}
	}

	/// Rebuild a store from persisted parts. Index entries are derived from the records.
	pub fn restore(
		meta: StoreMeta,
		next_key: u64,
		records: Vec<(Key, Value)>,
		index_metas: Vec<IndexMeta>,
	) -> Self {
		let mut store = Self::new(meta);
		store.next_key = next_key;
		store.records = records.into_iter().collect();
		for meta in index_metas {
			let mut index = IndexData::new(meta);
			for (primary, value) in store.records.iter() {
				let keys = index.keys_for(value);
				index.insert(&keys, primary);
			}
			store.indexes.insert(index.meta.name.clone(), index);
		}
		store
	}

	/// Next value the key generator would produce.
	pub fn current_key(&self) -> u64 {
		self.next_key
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn records(&self) -> impl Iterator<Item = (&Key, &Value)> {
		self.records.iter()
	}

	// Indexes

	/// Index names in lexicographic order.
	pub fn index_names(&self) -> Vec<String> {
		self.indexes.keys().cloned().collect()
	}

	pub fn index(&self, name: &str) -> Option<&IndexData> {
		self.indexes.get(name)
	}

	pub fn index_metas(&self) -> Vec<IndexMeta> {
		self.indexes.values().map(|i| i.meta.clone()).collect()
	}

	/// Add an index and populate it from existing records.
	///
	/// Returns the index generation, plus the uniqueness violation found while
	/// populating, if any. The index is created either way.
	pub fn create_index(&mut self, meta: IndexMeta) -> StrataResult<(u64, Option<StrataError>)> {
		if self.indexes.contains_key(&meta.name) {
			return Err(StrataError::Constraint(format!(
				"index \"{}\" already exists on \"{}\"",
				meta.name, self.meta.name
			)));
		}

		let mut index = IndexData::new(meta);
		let mut violation = None;
		for (primary, value) in self.records.iter() {
			let keys = index.keys_for(value);
			if violation.is_none()
				&& let Err(err) = index.check_unique(&keys, primary)
			{
				violation = Some(err);
			}
			index.insert(&keys, primary);
		}

		let generation = index.generation;
		self.indexes.insert(index.meta.name.clone(), index);
		Ok((generation, violation))
	}

	pub fn delete_index(&mut self, name: &str) -> StrataResult<()> {
		self.indexes
			.remove(name)
			.map(|_| ())
			.ok_or_else(|| StrataError::NotFound(format!("no index named \"{name}\"")))
	}

	// Writes

	/// Insert or replace a record, resolving its primary key first.
	///
	/// Key resolution, generator injection and index uniqueness are all
	/// checked before anything changes, so a failed write leaves the store
	/// (and its key generator) untouched.
	pub fn write(&mut self, mut value: Value, key: Option<Key>, mode: WriteMode) -> StrataResult<Key> {
		if let Some(key) = &key {
			key.validate()?;
		}

		let (primary, generated) = match (&self.meta.key_path, key) {
			(Some(_), Some(_)) => {
				return Err(StrataError::Data(
					"an explicit key cannot be given for a store with an in-line key path".into(),
				));
			}
			(Some(path), None) => match path.extract(&value) {
				Ok(key) => (key, false),
				Err(ExtractionFailure::Missing) if self.meta.auto_increment => {
					if !path.can_inject(&value) {
						return Err(StrataError::Data(format!(
							"value cannot hold a generated key at {path}"
						)));
					}
					let key = self.generate_key()?;
					path.inject(&mut value, &key)?;
					(key, true)
				}
				Err(_) => {
					return Err(StrataError::Data(format!(
						"key path {path} did not yield a valid key"
					)));
				}
			},
			(None, Some(key)) => (key, false),
			(None, None) if self.meta.auto_increment => (self.generate_key()?, true),
			(None, None) => {
				return Err(StrataError::Data(
					"store has no key path and no key generator; a key is required".into(),
				));
			}
		};

		if mode == WriteMode::Add && self.records.contains_key(&primary) {
			return Err(StrataError::Constraint(format!(
				"a record with key {primary} already exists in \"{}\"",
				self.meta.name
			)));
		}

		self.store_record(primary.clone(), value)?;

		if generated {
			self.next_key += 1;
		} else if self.meta.auto_increment {
			self.bump_generator(&primary);
		}
		Ok(primary)
	}

	/// Replace the value at an existing primary key, as a cursor update does.
	/// An in-line key path must still yield the same key.
	pub fn update_at(&mut self, primary: &Key, value: Value) -> StrataResult<()> {
		if let Some(path) = &self.meta.key_path {
			match path.extract(&value) {
				Ok(key) if &key == primary => {}
				_ => {
					return Err(StrataError::Data(
						"the new value changes the record's in-line key".into(),
					));
				}
			}
		}
		if !self.records.contains_key(primary) {
			return Err(StrataError::InvalidState(format!(
				"record {primary} no longer exists"
			)));
		}
		self.store_record(primary.clone(), value)
	}

	fn store_record(&mut self, primary: Key, value: Value) -> StrataResult<()> {
		let mut updates = Vec::with_capacity(self.indexes.len());
		for (name, index) in &self.indexes {
			let keys = index.keys_for(&value);
			index.check_unique(&keys, &primary)?;
			updates.push((name.clone(), keys));
		}

		if let Some(old) = self.records.get(&primary) {
			let old = old.clone();
			for index in self.indexes.values_mut() {
				let old_keys = index.keys_for(&old);
				index.remove(&old_keys, &primary);
			}
		}
		for (name, keys) in updates {
			if let Some(index) = self.indexes.get_mut(&name) {
				index.insert(&keys, &primary);
			}
		}
		self.records.insert(primary, value);
		Ok(())
	}

	fn generate_key(&self) -> StrataResult<Key> {
		if self.next_key > MAX_GENERATED_KEY {
			return Err(StrataError::Constraint(format!(
				"key generator for \"{}\" is exhausted",
				self.meta.name
			)));
		}
		Ok(Key::Number(self.next_key as f64))
	}

	fn bump_generator(&mut self, key: &Key) {
		let Some(n) = key.as_number() else {
			return;
		};
		if n >= self.next_key as f64 {
			let next = n.floor() + 1.0;
			self.next_key = if next > MAX_GENERATED_KEY as f64 {
				MAX_GENERATED_KEY + 1
			} else {
				next as u64
			};
		}
	}

	/// Remove every record in range. Returns how many were removed.
	pub fn delete(&mut self, range: &KeyRange) -> usize {
		let doomed: Vec<Key> = self.keys_in(range).cloned().collect();
		for primary in &doomed {
			if let Some(old) = self.records.remove(primary) {
				for index in self.indexes.values_mut() {
					let old_keys = index.keys_for(&old);
					index.remove(&old_keys, primary);
				}
			}
		}
		doomed.len()
	}

	pub fn clear(&mut self) {
		self.records = OrdMap::new();
		for index in self.indexes.values_mut() {
			index.clear();
		}
	}

	// Reads

	pub fn get(&self, primary: &Key) -> Option<&Value> {
		self.records.get(primary)
	}

	pub fn contains(&self, primary: &Key) -> bool {
		self.records.contains_key(primary)
	}

	/// First record in range.
	pub fn first_in(&self, range: &KeyRange) -> Option<(&Key, &Value)> {
		if bounds_empty(range.bounds()) {
			return None;
		}
		self.records.range(range.bounds()).next()
	}

	pub fn keys_in<'a>(&'a self, range: &'a KeyRange) -> impl Iterator<Item = &'a Key> + 'a {
		self.entries_in(range).map(|(k, _)| k)
	}

	pub fn entries_in<'a>(&'a self, range: &'a KeyRange) -> Box<dyn Iterator<Item = (&'a Key, &'a Value)> + 'a> {
		if bounds_empty(range.bounds()) {
			Box::new(std::iter::empty())
		} else {
			Box::new(self.records.range(range.bounds()))
		}
	}

	pub fn count(&self, range: &KeyRange) -> usize {
		self.entries_in(range).count()
	}

	/// First key in range that also satisfies `from`.
	pub fn first_key(&self, range: &KeyRange, from: Bound<&Key>) -> Option<&Key> {
		let bounds = (tighter_lower(range.start_bound(), from), range.end_bound());
		if bounds_empty(bounds) {
			return None;
		}
		self.records.range(bounds).next().map(|(k, _)| k)
	}

	/// Last key in range that also satisfies `until`.
	pub fn last_key(&self, range: &KeyRange, until: Bound<&Key>) -> Option<&Key> {
		let bounds = (range.start_bound(), tighter_upper(range.end_bound(), until));
		if bounds_empty(bounds) {
			return None;
		}
		self.records.range(bounds).next_back().map(|(k, _)| k)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;
	use pretty_assertions::assert_eq;
	use serde_json::json;

	fn store(key_path: Option<&str>, auto_increment: bool) -> StoreData {
		StoreData::new(StoreMeta {
			name: "store".into(),
			key_path: key_path.map(KeyPath::from),
			auto_increment,
		})
	}

	fn v(json: serde_json::Value) -> Value {
		Value::from(json)
	}

	#[test]
	fn test_key_requirements() {
		let mut plain = store(None, false);
		let err = plain.write(v(json!({})), None, WriteMode::Add).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Data);
		assert_eq!(
			plain.write(v(json!({})), Some(Key::from(1)), WriteMode::Add).unwrap(),
			Key::from(1)
		);

		let mut inline = store(Some("id"), false);
		let err = inline
			.write(v(json!({"id": 5})), Some(Key::from(5)), WriteMode::Add)
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Data);
		let err = inline.write(v(json!({})), None, WriteMode::Add).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Data);
		assert_eq!(inline.write(v(json!({"id": 5})), None, WriteMode::Add).unwrap(), Key::from(5));

		let err = plain
			.write(v(json!({})), Some(Key::Number(f64::NAN)), WriteMode::Put)
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Data);
	}

	#[test]
	fn test_add_duplicate_is_constraint_error() {
		let mut s = store(None, false);
		s.write(v(json!(1)), Some(Key::from(0)), WriteMode::Add).unwrap();
		let err = s.write(v(json!(2)), Some(Key::Number(-0.0)), WriteMode::Add).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Constraint);
		s.write(v(json!(3)), Some(Key::Number(-0.0)), WriteMode::Put).unwrap();
		assert_eq!(s.get(&Key::from(0)), Some(&v(json!(3))));
		assert_eq!(s.len(), 1);
	}

	#[test]
	fn test_generator_follows_explicit_keys() {
		let mut s = store(None, true);
		assert_eq!(s.write(v(json!("a")), None, WriteMode::Add).unwrap(), Key::from(1));
		assert_eq!(s.write(v(json!("b")), Some(Key::from(100)), WriteMode::Add).unwrap(), Key::from(100));
		assert_eq!(s.write(v(json!("c")), None, WriteMode::Add).unwrap(), Key::from(101));
		s.write(v(json!("d")), Some(Key::from(5.5)), WriteMode::Add).unwrap();
		s.write(v(json!("e")), Some(Key::from("x")), WriteMode::Add).unwrap();
		assert_eq!(s.current_key(), 102);

		s.delete(&KeyRange::all());
		assert_eq!(s.write(v(json!("f")), None, WriteMode::Add).unwrap(), Key::from(102));
	}

	#[test]
	fn test_inline_generated_key_injection() {
		let mut s = store(Some("foo.id"), true);
		assert_eq!(s.write(v(json!({})), None, WriteMode::Add).unwrap(), Key::from(1));
		assert_eq!(s.get(&Key::from(1)), Some(&v(json!({"foo": {"id": 1}}))));

		assert_eq!(
			s.write(v(json!({"value": 2, "foo": {"id": 10}})), None, WriteMode::Add).unwrap(),
			Key::from(10)
		);
		assert_eq!(s.write(v(json!({"value": 2})), None, WriteMode::Add).unwrap(), Key::from(11));

		for bad in [json!(true), json!({"foo": 12}), json!({"foo": {"id": true}}), json!(null)] {
			let before = s.current_key();
			let err = s.write(v(bad), None, WriteMode::Add).unwrap_err();
			assert_eq!(err.kind(), ErrorKind::Data);
			assert_eq!(s.current_key(), before);
		}
	}

	#[test]
	fn test_generator_exhaustion() {
		let mut s = store(None, true);
		s.write(v(json!(1)), Some(Key::from(MAX_GENERATED_KEY as f64)), WriteMode::Add)
			.unwrap();
		let err = s.write(v(json!(2)), None, WriteMode::Add).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Constraint);
	}

	#[test]
	fn test_indexes_follow_writes() {
		let mut s = store(Some("ssn"), false);
		s.create_index(IndexMeta {
			name: "name".into(),
			key_path: KeyPath::from("name"),
			unique: true,
			multi_entry: false,
		})
		.unwrap();

		s.write(v(json!({"ssn": "1", "name": "Ann"})), None, WriteMode::Add).unwrap();
		s.write(v(json!({"ssn": "2", "name": "Bob"})), None, WriteMode::Add).unwrap();

		let err = s
			.write(v(json!({"ssn": "3", "name": "Ann"})), None, WriteMode::Add)
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Constraint);
		assert_eq!(s.len(), 2);

		// renaming frees the old index key
		s.write(v(json!({"ssn": "1", "name": "Cat"})), None, WriteMode::Put).unwrap();
		s.write(v(json!({"ssn": "3", "name": "Ann"})), None, WriteMode::Add).unwrap();

		let index = s.index("name").unwrap();
		assert_eq!(index.len(), 3);
		s.delete(&KeyRange::only("2").unwrap());
		assert_eq!(s.index("name").unwrap().len(), 2);
		s.clear();
		assert!(s.index("name").unwrap().is_empty());
	}

	#[test]
	fn test_create_index_reports_population_violation() {
		let mut s = store(None, false);
		s.write(v(json!({"k": 1})), Some(Key::from(1)), WriteMode::Add).unwrap();
		s.write(v(json!({"k": 1})), Some(Key::from(2)), WriteMode::Add).unwrap();
		let (_, violation) = s
			.create_index(IndexMeta {
				name: "k".into(),
				key_path: KeyPath::from("k"),
				unique: true,
				multi_entry: false,
			})
			.unwrap();
		assert_eq!(violation.map(|e| e.kind()), Some(ErrorKind::Constraint));
	}

	#[test]
	fn test_update_at_keeps_inline_key() {
		let mut s = store(Some("id"), false);
		s.write(v(json!({"id": 1, "x": 1})), None, WriteMode::Add).unwrap();
		s.update_at(&Key::from(1), v(json!({"id": 1, "x": 2}))).unwrap();
		let err = s.update_at(&Key::from(1), v(json!({"id": 2}))).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Data);
		assert_eq!(s.get(&Key::from(1)), Some(&v(json!({"id": 1, "x": 2}))));
	}

	#[test]
	fn test_restore_rebuilds_indexes() {
		let meta = StoreMeta {
			name: "people".into(),
			key_path: Some(KeyPath::from("ssn")),
			auto_increment: false,
		};
		let records = vec![
			(Key::from("1"), v(json!({"ssn": "1", "w": 10}))),
			(Key::from("2"), v(json!({"ssn": "2", "w": 20}))),
		];
		let restored = StoreData::restore(
			meta,
			1,
			records,
			vec![IndexMeta {
				name: "w".into(),
				key_path: KeyPath::from("w"),
				unique: false,
				multi_entry: false,
			}],
		);
		assert_eq!(restored.len(), 2);
		assert_eq!(restored.index("w").unwrap().len(), 2);
	}
}
