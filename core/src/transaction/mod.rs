//! Transaction management
//!
//! A transaction works on a copy-on-write snapshot of the committed state,
//! taken once its scope locks are granted. Commit publishes the snapshot's
//! scope stores (or, for a version change, the whole schema) and persists the
//! result; abort throws the snapshot away.

pub(crate) mod lock;

use crate::database::{ConnectionInner, Database};
use crate::error::{StrataError, StrataResult};
use crate::handle::{ObjectStore, ObjectStoreParameters};
use crate::storage::{DatabaseState, StoreData, StoreMeta};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(pub u64);

/// Transaction modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionMode {
	#[default]
	ReadOnly,
	ReadWrite,
	VersionChange,
}

impl fmt::Display for TransactionMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			TransactionMode::ReadOnly => "readonly",
			TransactionMode::ReadWrite => "readwrite",
			TransactionMode::VersionChange => "versionchange",
		})
	}
}

/// Transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
	Active,
	Committing,
	Committed,
	Aborting,
	Aborted,
}

impl TransactionState {
	pub fn is_finished(&self) -> bool {
		matches!(self, TransactionState::Committed | TransactionState::Aborted)
	}
}

struct TxnCell {
	state: TransactionState,
	/// Snapshot taken at begin; restored on abort so metadata reads stay sane.
	initial: DatabaseState,
	working: DatabaseState,
	dirty: bool,
	/// Failure discovered lazily (index population); commit turns into abort.
	doomed: Option<StrataError>,
}

pub(crate) struct TransactionInner {
	pub(crate) id: TxnId,
	pub(crate) mode: TransactionMode,
	scope: Vec<String>,
	pub(crate) connection: Arc<ConnectionInner>,
	cell: Mutex<TxnCell>,
}

/// Handle to a transaction. Clones refer to the same transaction.
///
/// A transaction still active when its last handle (including any store,
/// index or cursor handle derived from it) is dropped commits implicitly.
#[derive(Clone)]
pub struct Transaction {
	pub(crate) inner: Arc<TransactionInner>,
}

impl Transaction {
	/// Lock `scope` and snapshot the committed state.
	pub(crate) fn begin(
		connection: Arc<ConnectionInner>,
		mode: TransactionMode,
		mut scope: Vec<String>,
	) -> StrataResult<Self> {
		scope.sort();
		scope.dedup();

		let id = TxnId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst));
		let shared = Arc::clone(&connection.shared);
		shared
			.locks
			.acquire(id, mode, &scope, shared.config.lock_timeout())?;

		let snapshot = shared.state.read().clone();
		tracing::debug!(
			"Begin transaction {} ({mode}) on \"{}\" over {:?}",
			id.0,
			shared.name,
			scope
		);

		Ok(Self {
			inner: Arc::new(TransactionInner {
				id,
				mode,
				scope,
				connection,
				cell: Mutex::new(TxnCell {
					state: TransactionState::Active,
					initial: snapshot.clone(),
					working: snapshot,
					dirty: false,
					doomed: None,
				}),
			}),
		})
	}

	pub fn id(&self) -> TxnId {
		self.inner.id
	}

	pub fn mode(&self) -> TransactionMode {
		self.inner.mode
	}

	pub fn state(&self) -> TransactionState {
		self.inner.cell.lock().state
	}

	pub fn is_active(&self) -> bool {
		self.state() == TransactionState::Active
	}

	/// The connection this transaction runs on.
	pub fn database(&self) -> Database {
		Database::from_inner(Arc::clone(&self.inner.connection))
	}

	/// Stores visible to this transaction, sorted.
	pub fn object_store_names(&self) -> Vec<String> {
		match self.inner.mode {
			TransactionMode::VersionChange => self.inner.cell.lock().working.store_names(),
			_ => self.inner.scope.clone(),
		}
	}

	/// Open a store in this transaction's scope.
	pub fn object_store(&self, name: &str) -> StrataResult<ObjectStore> {
		let generation = self.inner.read(|state| {
			if self.inner.mode != TransactionMode::VersionChange
				&& self.inner.scope.binary_search_by(|s| s.as_str().cmp(name)).is_err()
			{
				return Err(StrataError::NotFound(format!(
					"object store \"{name}\" is not in this transaction's scope"
				)));
			}
			state
				.stores
				.get(name)
				.map(|store| store.generation)
				.ok_or_else(|| StrataError::NotFound(format!("no object store named \"{name}\"")))
		})?;
		Ok(ObjectStore::new(self.clone(), name.to_string(), generation))
	}

	/// Create an object store. Version-change transactions only.
	pub fn create_object_store(
		&self,
		name: &str,
		params: ObjectStoreParameters,
	) -> StrataResult<ObjectStore> {
		self.require_version_change("create an object store")?;

		if let Some(path) = &params.key_path {
			path.validate()?;
			if params.auto_increment && (path.is_compound() || path.is_empty_path()) {
				return Err(StrataError::InvalidAccess(
					"a key generator cannot be combined with an empty or compound key path".into(),
				));
			}
		}

		let generation = self.inner.write(|state| {
			if state.stores.contains_key(name) {
				return Err(StrataError::Constraint(format!(
					"object store \"{name}\" already exists"
				)));
			}
			let store = StoreData::new(StoreMeta {
				name: name.to_string(),
				key_path: params.key_path.clone(),
				auto_increment: params.auto_increment,
			});
			let generation = store.generation;
			state.stores.insert(name.to_string(), store);
			Ok(generation)
		})?;

		tracing::debug!("Created object store \"{name}\" in transaction {}", self.inner.id.0);
		Ok(ObjectStore::new(self.clone(), name.to_string(), generation))
	}

	/// Delete an object store with its records and indexes. Version-change transactions only.
	pub fn delete_object_store(&self, name: &str) -> StrataResult<()> {
		self.require_version_change("delete an object store")?;
		self.inner.write(|state| {
			state
				.stores
				.remove(name)
				.map(|_| ())
				.ok_or_else(|| StrataError::NotFound(format!("no object store named \"{name}\"")))
		})
	}

	/// Commit now.
	pub fn commit(&self) -> StrataResult<()> {
		self.inner.commit()
	}

	/// Roll back every change made in this transaction. A second call fails
	/// with `InvalidStateError`.
	pub fn abort(&self) -> StrataResult<()> {
		self.inner.abort()
	}

	fn require_version_change(&self, what: &str) -> StrataResult<()> {
		if self.inner.mode != TransactionMode::VersionChange {
			return Err(StrataError::InvalidState(format!(
				"cannot {what} outside a version-change transaction"
			)));
		}
		Ok(())
	}
}

impl PartialEq for Transaction {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Transaction")
			.field("id", &self.inner.id.0)
			.field("mode", &self.inner.mode)
			.field("state", &self.state())
			.finish()
	}
}

impl TransactionInner {
	fn ensure_active(cell: &TxnCell) -> StrataResult<()> {
		match cell.state {
			TransactionState::Active => Ok(()),
			state => Err(StrataError::InvalidState(format!(
				"transaction is no longer active ({state:?})"
			))),
		}
	}

	/// Run `f` against the working state of an active transaction.
	pub(crate) fn read<T>(&self, f: impl FnOnce(&DatabaseState) -> StrataResult<T>) -> StrataResult<T> {
		let cell = self.cell.lock();
		Self::ensure_active(&cell)?;
		f(&cell.working)
	}

	/// Run a mutation against the working state. Fails with `ReadOnlyError`
	/// in a readonly transaction.
	pub(crate) fn write<T>(
		&self,
		f: impl FnOnce(&mut DatabaseState) -> StrataResult<T>,
	) -> StrataResult<T> {
		let mut cell = self.cell.lock();
		Self::ensure_active(&cell)?;
		if self.mode == TransactionMode::ReadOnly {
			return Err(StrataError::ReadOnly(
				"cannot modify data in a readonly transaction".into(),
			));
		}
		let result = f(&mut cell.working)?;
		cell.dirty = true;
		Ok(result)
	}

	/// Read the working state whether or not the transaction is still active.
	pub(crate) fn inspect<T>(&self, f: impl FnOnce(&DatabaseState) -> T) -> T {
		f(&self.cell.lock().working)
	}

	/// Record a deferred failure; the commit becomes an abort reporting it.
	pub(crate) fn doom(&self, err: StrataError) {
		let mut cell = self.cell.lock();
		if cell.doomed.is_none() {
			cell.doomed = Some(err);
		}
	}

	pub(crate) fn commit(&self) -> StrataResult<()> {
		let mut cell = self.cell.lock();
		Self::ensure_active(&cell)?;

		if let Some(err) = cell.doomed.take() {
			self.abort_locked(&mut cell);
			return Err(err);
		}

		cell.state = TransactionState::Committing;
		let shared = &self.connection.shared;
		let result = match self.mode {
			TransactionMode::ReadOnly => Ok(()),
			TransactionMode::ReadWrite if !cell.dirty => Ok(()),
			TransactionMode::ReadWrite => {
				let working = &cell.working;
				shared.publish(|committed| {
					for name in &self.scope {
						match working.stores.get(name) {
							Some(store) => {
								committed.stores.insert(name.clone(), store.clone());
							}
							None => {
								committed.stores.remove(name);
							}
						}
					}
				})
			}
			TransactionMode::VersionChange => {
				let working = cell.working.clone();
				shared.publish(move |committed| *committed = working)
			}
		};

		if let Err(err) = result {
			tracing::warn!("Commit of transaction {} failed: {}", self.id.0, err);
			self.abort_locked(&mut cell);
			return Err(err);
		}

		cell.state = TransactionState::Committed;
		drop(cell);
		shared.locks.release_all(self.id);
		tracing::debug!("Committed transaction {} ({})", self.id.0, self.mode);
		Ok(())
	}

	pub(crate) fn abort(&self) -> StrataResult<()> {
		let mut cell = self.cell.lock();
		if cell.state != TransactionState::Active {
			return Err(StrataError::InvalidState(
				"transaction has already finished".into(),
			));
		}
		self.abort_locked(&mut cell);
		Ok(())
	}

	fn abort_locked(&self, cell: &mut TxnCell) {
		cell.state = TransactionState::Aborting;
		cell.working = cell.initial.clone();
		cell.dirty = false;
		if self.mode == TransactionMode::VersionChange {
			self.connection.revert_upgrade(&cell.initial);
		}
		cell.state = TransactionState::Aborted;
		self.connection.shared.locks.release_all(self.id);
		tracing::debug!("Aborted transaction {} ({})", self.id.0, self.mode);
	}
}

impl Drop for TransactionInner {
	fn drop(&mut self) {
		let active = self.cell.get_mut().state == TransactionState::Active;
		if active && let Err(err) = self.commit() {
			tracing::warn!("Implicit commit of transaction {} failed: {}", self.id.0, err);
		}
	}
}
