//! Object store handle

use crate::error::{StrataError, StrataResult};
use crate::handle::cursor::{Cursor, CursorDirection, CursorTarget};
use crate::handle::index::{Index, IndexParameters};
use crate::handle::{deleted, limit, query_range};
use crate::key::{Key, KeyRange};
use crate::keypath::KeyPath;
use crate::storage::DatabaseState;
use crate::storage::index::IndexMeta;
use crate::storage::store::{StoreData, WriteMode};
use crate::transaction::{Transaction, TransactionMode};
use crate::value::Value;
use std::fmt;

/// Options for [`Transaction::create_object_store`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectStoreParameters {
	/// In-line key path. `None` means keys are supplied out of line.
	pub key_path: Option<KeyPath>,
	/// Attach a key generator.
	pub auto_increment: bool,
}

impl ObjectStoreParameters {
	pub fn key_path(path: impl Into<KeyPath>) -> Self {
		Self {
			key_path: Some(path.into()),
			auto_increment: false,
		}
	}

	pub fn auto_increment(mut self) -> Self {
		self.auto_increment = true;
		self
	}
}

/// An object store as seen through one transaction.
#[derive(Clone)]
pub struct ObjectStore {
	pub(crate) txn: Transaction,
	name: String,
	generation: u64,
}

impl ObjectStore {
	pub(crate) fn new(txn: Transaction, name: String, generation: u64) -> Self {
		Self { txn, name, generation }
	}

	pub(crate) fn resolve<'a>(&self, state: &'a DatabaseState) -> StrataResult<&'a StoreData> {
		state
			.stores
			.get(&self.name)
			.filter(|store| store.generation == self.generation)
			.ok_or_else(|| deleted("object store", &self.name))
	}

	fn resolve_mut<'a>(&self, state: &'a mut DatabaseState) -> StrataResult<&'a mut StoreData> {
		state
			.stores
			.get_mut(&self.name)
			.filter(|store| store.generation == self.generation)
			.ok_or_else(|| deleted("object store", &self.name))
	}

	/// Run `f` on this store in the transaction's working state.
	pub(crate) fn read<T>(&self, f: impl FnOnce(&StoreData) -> StrataResult<T>) -> StrataResult<T> {
		self.txn.inner.read(|state| f(self.resolve(state)?))
	}

	pub(crate) fn write<T>(&self, f: impl FnOnce(&mut StoreData) -> StrataResult<T>) -> StrataResult<T> {
		self.txn.inner.write(|state| f(self.resolve_mut(state)?))
	}

	// Metadata

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn transaction(&self) -> &Transaction {
		&self.txn
	}

	pub fn key_path(&self) -> Option<KeyPath> {
		self.txn.inner.inspect(|state| {
			self.resolve(state)
				.ok()
				.and_then(|store| store.meta.key_path.clone())
		})
	}

	pub fn auto_increment(&self) -> bool {
		self.txn
			.inner
			.inspect(|state| self.resolve(state).is_ok_and(|store| store.meta.auto_increment))
	}

	/// Index names, sorted.
	pub fn index_names(&self) -> Vec<String> {
		self.txn.inner.inspect(|state| {
			self.resolve(state)
				.map(|store| store.index_names())
				.unwrap_or_default()
		})
	}

	// Writes

	/// Insert a record. Fails with `ConstraintError` if the key is taken.
	pub fn add(&self, value: impl Into<Value>, key: Option<Key>) -> StrataResult<Key> {
		self.store_value(value.into(), key, WriteMode::Add)
	}

	/// Insert or replace a record.
	pub fn put(&self, value: impl Into<Value>, key: Option<Key>) -> StrataResult<Key> {
		self.store_value(value.into(), key, WriteMode::Put)
	}

	fn store_value(&self, value: Value, key: Option<Key>, mode: WriteMode) -> StrataResult<Key> {
		let key = self.write(|store| store.write(value, key, mode))?;
		tracing::trace!("Stored record {} in \"{}\"", key, self.name);
		Ok(key)
	}

	/// Delete every record matching `query`.
	pub fn delete(&self, query: impl Into<KeyRange>) -> StrataResult<()> {
		let range = query.into();
		range.validate()?;
		let removed = self.write(|store| Ok(store.delete(&range)))?;
		tracing::trace!("Deleted {} record(s) from \"{}\"", removed, self.name);
		Ok(())
	}

	pub fn clear(&self) -> StrataResult<()> {
		self.write(|store| {
			store.clear();
			Ok(())
		})
	}

	// Reads

	/// Value of the first record matching `query`.
	pub fn get(&self, query: impl Into<KeyRange>) -> StrataResult<Option<Value>> {
		let range = query.into();
		range.validate()?;
		self.read(|store| Ok(store.first_in(&range).map(|(_, value)| value.clone())))
	}

	/// Primary key of the first record matching `query`.
	pub fn get_key(&self, query: impl Into<KeyRange>) -> StrataResult<Option<Key>> {
		let range = query.into();
		range.validate()?;
		self.read(|store| Ok(store.first_in(&range).map(|(key, _)| key.clone())))
	}

	pub fn count(&self, range: Option<KeyRange>) -> StrataResult<usize> {
		let range = query_range(range)?;
		self.read(|store| Ok(store.count(&range)))
	}

	/// Values in key order, at most `count` of them (`None` or 0: all).
	pub fn get_all(&self, range: Option<KeyRange>, count: Option<u32>) -> StrataResult<Vec<Value>> {
		let range = query_range(range)?;
		self.read(|store| {
			Ok(store
				.entries_in(&range)
				.take(limit(count))
				.map(|(_, value)| value.clone())
				.collect())
		})
	}

	pub fn get_all_keys(&self, range: Option<KeyRange>, count: Option<u32>) -> StrataResult<Vec<Key>> {
		let range = query_range(range)?;
		self.read(|store| Ok(store.keys_in(&range).take(limit(count)).cloned().collect()))
	}

	/// Open a cursor over records. `None` when nothing matches.
	pub fn open_cursor(
		&self,
		range: Option<KeyRange>,
		direction: CursorDirection,
	) -> StrataResult<Option<Cursor>> {
		Cursor::open(self.clone(), CursorTarget::Store, query_range(range)?, direction, false)
	}

	/// Like [`ObjectStore::open_cursor`] but without loading values.
	pub fn open_key_cursor(
		&self,
		range: Option<KeyRange>,
		direction: CursorDirection,
	) -> StrataResult<Option<Cursor>> {
		Cursor::open(self.clone(), CursorTarget::Store, query_range(range)?, direction, true)
	}

	// Indexes

	/// Create an index and populate it from the existing records.
	/// Version-change transactions only.
	///
	/// A uniqueness violation among the existing records does not fail this
	/// call; it aborts the version change when it commits.
	pub fn create_index(
		&self,
		name: &str,
		key_path: impl Into<KeyPath>,
		params: IndexParameters,
	) -> StrataResult<Index> {
		self.require_version_change("create an index")?;
		let key_path = key_path.into();
		key_path.validate()?;
		if params.multi_entry && key_path.is_compound() {
			return Err(StrataError::InvalidAccess(
				"a multi-entry index cannot use a compound key path".into(),
			));
		}

		let (generation, violation) = self.write(|store| {
			store.create_index(IndexMeta {
				name: name.to_string(),
				key_path,
				unique: params.unique,
				multi_entry: params.multi_entry,
			})
		})?;

		if let Some(err) = violation {
			tracing::warn!(
				"Index \"{}\" on \"{}\" violates uniqueness; the upgrade will abort",
				name,
				self.name
			);
			self.txn.inner.doom(err);
		}

		Ok(Index::new(self.clone(), name.to_string(), generation))
	}

	/// Delete an index. Version-change transactions only.
	pub fn delete_index(&self, name: &str) -> StrataResult<()> {
		self.require_version_change("delete an index")?;
		self.write(|store| store.delete_index(name))
	}

	pub fn index(&self, name: &str) -> StrataResult<Index> {
		let generation = self.read(|store| {
			store
				.index(name)
				.map(|index| index.generation)
				.ok_or_else(|| StrataError::NotFound(format!("no index named \"{name}\" on \"{}\"", self.name)))
		})?;
		Ok(Index::new(self.clone(), name.to_string(), generation))
	}

	fn require_version_change(&self, what: &str) -> StrataResult<()> {
		if self.txn.mode() != TransactionMode::VersionChange {
			return Err(StrataError::InvalidState(format!(
				"cannot {what} outside a version-change transaction"
			)));
		}
		Ok(())
	}
}

impl PartialEq for ObjectStore {
	fn eq(&self, other: &Self) -> bool {
		self.txn == other.txn && self.name == other.name && self.generation == other.generation
	}
}

impl Eq for ObjectStore {}

impl fmt::Debug for ObjectStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ObjectStore")
			.field("name", &self.name)
			.field("transaction", &self.txn.id().0)
			.finish()
	}
}
