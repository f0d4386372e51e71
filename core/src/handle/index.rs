//! Index handle

use crate::error::StrataResult;
use crate::handle::cursor::{Cursor, CursorDirection, CursorTarget};
use crate::handle::object_store::ObjectStore;
use crate::handle::{deleted, limit, query_range};
use crate::key::{Key, KeyRange};
use crate::keypath::KeyPath;
use crate::storage::{IndexData, StoreData};
use crate::value::Value;
use std::fmt;

/// Options for [`ObjectStore::create_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexParameters {
	pub unique: bool,
	/// Index each element of an array-valued key separately.
	pub multi_entry: bool,
}

impl IndexParameters {
	pub fn unique() -> Self {
		Self {
			unique: true,
			multi_entry: false,
		}
	}

	pub fn multi_entry() -> Self {
		Self {
			unique: false,
			multi_entry: true,
		}
	}
}

/// A secondary index as seen through one transaction.
#[derive(Clone)]
pub struct Index {
	store: ObjectStore,
	name: String,
	generation: u64,
}

impl Index {
	pub(crate) fn new(store: ObjectStore, name: String, generation: u64) -> Self {
		Self {
			store,
			name,
			generation,
		}
	}

	pub(crate) fn resolve<'a>(&self, store: &'a StoreData) -> StrataResult<&'a IndexData> {
		store
			.index(&self.name)
			.filter(|index| index.generation == self.generation)
			.ok_or_else(|| deleted("index", &self.name))
	}

	fn read<T>(&self, f: impl FnOnce(&StoreData, &IndexData) -> StrataResult<T>) -> StrataResult<T> {
		self.store.read(|store| f(store, self.resolve(store)?))
	}

	fn meta<T: Default>(&self, f: impl FnOnce(&IndexData) -> T) -> T {
		self.store.txn.inner.inspect(|state| {
			self.store
				.resolve(state)
				.and_then(|store| self.resolve(store))
				.map(f)
				.unwrap_or_default()
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn object_store(&self) -> &ObjectStore {
		&self.store
	}

	pub fn object_store_name(&self) -> &str {
		self.store.name()
	}

	pub fn key_path(&self) -> Option<KeyPath> {
		self.meta(|index| Some(index.meta.key_path.clone()))
	}

	pub fn unique(&self) -> bool {
		self.meta(|index| index.meta.unique)
	}

	pub fn multi_entry(&self) -> bool {
		self.meta(|index| index.meta.multi_entry)
	}

	/// Record referenced by the first entry matching `query`.
	pub fn get(&self, query: impl Into<KeyRange>) -> StrataResult<Option<Value>> {
		let range = query.into();
		range.validate()?;
		self.read(|store, index| {
			Ok(index
				.entries_in(&range)
				.next()
				.and_then(|(_, primary)| store.get(primary).cloned()))
		})
	}

	/// Primary key of the first entry matching `query`.
	pub fn get_key(&self, query: impl Into<KeyRange>) -> StrataResult<Option<Key>> {
		let range = query.into();
		range.validate()?;
		self.read(|_, index| Ok(index.entries_in(&range).next().map(|(_, primary)| primary.clone())))
	}

	/// Number of entries in range. A multi-entry record counts once per key.
	pub fn count(&self, range: Option<KeyRange>) -> StrataResult<usize> {
		let range = query_range(range)?;
		self.read(|_, index| Ok(index.count(&range)))
	}

	/// Referenced records in (index key, primary key) order.
	pub fn get_all(&self, range: Option<KeyRange>, count: Option<u32>) -> StrataResult<Vec<Value>> {
		let range = query_range(range)?;
		self.read(|store, index| {
			Ok(index
				.entries_in(&range)
				.take(limit(count))
				.filter_map(|(_, primary)| store.get(primary).cloned())
				.collect())
		})
	}

	/// Primary keys in (index key, primary key) order.
	pub fn get_all_keys(&self, range: Option<KeyRange>, count: Option<u32>) -> StrataResult<Vec<Key>> {
		let range = query_range(range)?;
		self.read(|_, index| {
			Ok(index
				.entries_in(&range)
				.take(limit(count))
				.map(|(_, primary)| primary.clone())
				.collect())
		})
	}

	pub fn open_cursor(
		&self,
		range: Option<KeyRange>,
		direction: CursorDirection,
	) -> StrataResult<Option<Cursor>> {
		Cursor::open(
			self.store.clone(),
			CursorTarget::Index(self.clone()),
			query_range(range)?,
			direction,
			false,
		)
	}

	pub fn open_key_cursor(
		&self,
		range: Option<KeyRange>,
		direction: CursorDirection,
	) -> StrataResult<Option<Cursor>> {
		Cursor::open(
			self.store.clone(),
			CursorTarget::Index(self.clone()),
			query_range(range)?,
			direction,
			true,
		)
	}
}

impl PartialEq for Index {
	fn eq(&self, other: &Self) -> bool {
		self.store == other.store && self.name == other.name && self.generation == other.generation
	}
}

impl Eq for Index {}

impl fmt::Debug for Index {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Index")
			.field("name", &self.name)
			.field("store", &self.store.name())
			.finish()
	}
}
