//! Database connections
//!
//! Every open connection to the same named database shares one
//! [`DatabaseShared`]: the committed state, the lock table and the registry of
//! live connections that version changes must wait on.

use crate::config::Config;
use crate::error::{StrataError, StrataResult};
use crate::handle::{ObjectStore, ObjectStoreParameters};
use crate::storage::snapshot::encode_state;
use crate::storage::{Backend, DatabaseState};
use crate::transaction::lock::LockManager;
use crate::transaction::{Transaction, TransactionInner, TransactionMode};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{
	Arc, Weak,
	atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Delivered to open connections when another connection wants to change
/// the version or delete the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChangeEvent {
	pub old_version: u64,
	/// `None` when the database is being deleted.
	pub new_version: Option<u64>,
}

/// Where a database lives.
///
/// Persistent databases use the factory's configured backend. Temporary ones
/// are kept in memory for the factory's lifetime and never share state with a
/// persistent database of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceType {
	#[default]
	Persistent,
	Temporary,
}

impl PersistenceType {
	pub fn as_str(&self) -> &'static str {
		match self {
			PersistenceType::Persistent => "persistent",
			PersistenceType::Temporary => "temporary",
		}
	}
}

impl fmt::Display for PersistenceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for PersistenceType {
	type Err = StrataError;

	fn from_str(s: &str) -> StrataResult<Self> {
		match s {
			"persistent" => Ok(PersistenceType::Persistent),
			"temporary" => Ok(PersistenceType::Temporary),
			other => Err(StrataError::Type(format!("unknown storage type \"{other}\""))),
		}
	}
}

pub(crate) type VersionChangeListener = Arc<dyn Fn(&Database, &VersionChangeEvent) + Send + Sync>;

struct ConnectionSlot {
	id: Uuid,
	closed: Arc<AtomicBool>,
	handle: Weak<ConnectionInner>,
}

/// State shared by every connection to one named database.
pub(crate) struct DatabaseShared {
	pub(crate) name: String,
	pub(crate) storage: PersistenceType,
	pub(crate) config: Arc<Config>,
	backend: Arc<dyn Backend>,
	pub(crate) state: RwLock<DatabaseState>,
	pub(crate) locks: LockManager,
	connections: Mutex<Vec<ConnectionSlot>>,
	connections_changed: Condvar,
	/// Serializes open and delete requests.
	pub(crate) open_lock: Mutex<()>,
	/// Serializes image writes so commits persist in publication order.
	persist_lock: Mutex<()>,
}

impl DatabaseShared {
	pub(crate) fn new(
		name: String,
		storage: PersistenceType,
		config: Arc<Config>,
		backend: Arc<dyn Backend>,
		state: DatabaseState,
	) -> Self {
		Self {
			name,
			storage,
			config,
			backend,
			state: RwLock::new(state),
			locks: LockManager::new(),
			connections: Mutex::new(Vec::new()),
			connections_changed: Condvar::new(),
			open_lock: Mutex::new(()),
			persist_lock: Mutex::new(()),
		}
	}

	pub(crate) fn version(&self) -> u64 {
		self.state.read().version
	}

	/// Apply `change` to a copy of the committed state, persist the copy and
	/// only then make it the committed state.
	pub(crate) fn publish<F>(&self, change: F) -> StrataResult<()>
	where
		F: FnOnce(&mut DatabaseState),
	{
		let _persist = self.persist_lock.lock();
		let mut next = self.state.read().clone();
		change(&mut next);

		let image = encode_state(&next)?;
		self.backend.write(&self.name, &image)?;
		tracing::debug!("Persisted \"{}\" ({} bytes)", self.name, image.len());
		*self.state.write() = next;
		Ok(())
	}

	/// Drop the persisted image and reset to an empty, version 0 database.
	pub(crate) fn erase(&self) -> StrataResult<()> {
		let _persist = self.persist_lock.lock();
		self.backend.remove(&self.name)?;
		*self.state.write() = DatabaseState::default();
		Ok(())
	}

	fn register(&self, connection: &Arc<ConnectionInner>) {
		let mut slots = self.connections.lock();
		slots.retain(|slot| !slot.closed.load(Ordering::SeqCst));
		slots.push(ConnectionSlot {
			id: connection.id,
			closed: Arc::clone(&connection.closed),
			handle: Arc::downgrade(connection),
		});
	}

	/// Open connections other than `except`.
	pub(crate) fn open_connections(&self, except: Option<Uuid>) -> Vec<Database> {
		let handles: Vec<Weak<ConnectionInner>> = {
			let slots = self.connections.lock();
			slots
				.iter()
				.filter(|slot| Some(slot.id) != except && !slot.closed.load(Ordering::SeqCst))
				.map(|slot| slot.handle.clone())
				.collect()
		};
		// Upgraded outside the registry lock: dropping the last handle closes
		// the connection, which takes that lock.
		handles
			.into_iter()
			.filter_map(|handle| handle.upgrade())
			.map(Database::from_inner)
			.collect()
	}

	/// Send a version change event to every other open connection.
	pub(crate) fn notify_version_change(&self, except: Option<Uuid>, event: VersionChangeEvent) {
		for db in self.open_connections(except) {
			let listener = db.inner.listener.read().clone();
			match listener {
				Some(listener) => listener(&db, &event),
				None => tracing::debug!(
					"Connection {} to \"{}\" has no version change listener",
					db.inner.id,
					self.name
				),
			}
		}
	}

	pub(crate) fn has_open_connections(&self, except: Option<Uuid>) -> bool {
		let slots = self.connections.lock();
		slots
			.iter()
			.any(|slot| Some(slot.id) != except && !slot.closed.load(Ordering::SeqCst))
	}

	/// Wait until every connection other than `except` has closed.
	pub(crate) fn wait_for_close(&self, except: Option<Uuid>, timeout: Duration) -> StrataResult<()> {
		let deadline = Instant::now() + timeout;
		let mut slots = self.connections.lock();
		loop {
			slots.retain(|slot| !slot.closed.load(Ordering::SeqCst));
			let open = slots.iter().filter(|slot| Some(slot.id) != except).count();
			if open == 0 {
				return Ok(());
			}
			if self
				.connections_changed
				.wait_until(&mut slots, deadline)
				.timed_out()
			{
				slots.retain(|slot| !slot.closed.load(Ordering::SeqCst));
				if slots.iter().all(|slot| Some(slot.id) == except) {
					return Ok(());
				}
				tracing::warn!("{} connection(s) to \"{}\" did not close", open, self.name);
				return Err(StrataError::Blocked(format!(
					"{open} connection(s) to \"{}\" stayed open for {:?}",
					self.name, timeout
				)));
			}
		}
	}

	fn connection_closed(&self) {
		let _slots = self.connections.lock();
		self.connections_changed.notify_all();
	}
}

/// Per-connection state.
pub(crate) struct ConnectionInner {
	pub(crate) id: Uuid,
	pub(crate) shared: Arc<DatabaseShared>,
	version: AtomicU64,
	store_names: RwLock<Vec<String>>,
	closed: Arc<AtomicBool>,
	listener: RwLock<Option<VersionChangeListener>>,
	/// The version-change transaction while an upgrade is running.
	upgrade: Mutex<Option<Weak<TransactionInner>>>,
}

impl ConnectionInner {
	/// Open and register a connection at `version`.
	pub(crate) fn open(shared: Arc<DatabaseShared>, version: u64) -> Arc<Self> {
		let store_names = shared.state.read().store_names();
		let connection = Arc::new(Self {
			id: Uuid::new_v4(),
			shared,
			version: AtomicU64::new(version),
			store_names: RwLock::new(store_names),
			closed: Arc::new(AtomicBool::new(false)),
			listener: RwLock::new(None),
			upgrade: Mutex::new(None),
		});
		connection.shared.register(&connection);
		connection
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn close(&self) {
		if !self.closed.swap(true, Ordering::SeqCst) {
			tracing::debug!("Closed connection {} to \"{}\"", self.id, self.shared.name);
			self.shared.connection_closed();
		}
	}

	pub(crate) fn begin_upgrade(&self, txn: &Transaction) {
		*self.upgrade.lock() = Some(Arc::downgrade(&txn.inner));
	}

	/// Upgrade finished; take the committed schema.
	pub(crate) fn finish_upgrade(&self) {
		*self.upgrade.lock() = None;
		let state = self.shared.state.read();
		self.version.store(state.version, Ordering::SeqCst);
		*self.store_names.write() = state.store_names();
	}

	/// Upgrade aborted; fall back to the schema the upgrade started from.
	pub(crate) fn revert_upgrade(&self, initial: &DatabaseState) {
		self.version.store(initial.version, Ordering::SeqCst);
		*self.store_names.write() = initial.store_names();
	}

	fn upgrade_transaction(&self) -> Option<Transaction> {
		let upgrade = self.upgrade.lock();
		let inner = upgrade.as_ref()?.upgrade()?;
		let txn = Transaction { inner };
		txn.is_active().then_some(txn)
	}
}

impl Drop for ConnectionInner {
	fn drop(&mut self) {
		self.close();
	}
}

/// A connection to a named database.
///
/// Clones share the connection. It closes on [`Database::close`] or when the
/// last handle (and every transaction started from it) is dropped.
#[derive(Clone)]
pub struct Database {
	pub(crate) inner: Arc<ConnectionInner>,
}

impl Database {
	pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
		Self { inner }
	}

	pub fn name(&self) -> &str {
		&self.inner.shared.name
	}

	pub fn version(&self) -> u64 {
		self.inner.version.load(Ordering::SeqCst)
	}

	pub fn storage(&self) -> PersistenceType {
		self.inner.shared.storage
	}

	/// Object store names, sorted. During an upgrade this reflects the
	/// upgrade's uncommitted schema.
	pub fn object_store_names(&self) -> Vec<String> {
		match self.inner.upgrade_transaction() {
			Some(txn) => txn.object_store_names(),
			None => self.inner.store_names.read().clone(),
		}
	}

	pub fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	/// Stop accepting new transactions. Running transactions finish normally.
	pub fn close(&self) {
		self.inner.close();
	}

	/// Register the listener for version change events on this connection.
	/// A listener that wants to let an upgrade or delete proceed should
	/// close the connection it is handed.
	pub fn on_version_change<F>(&self, listener: F)
	where
		F: Fn(&Database, &VersionChangeEvent) + Send + Sync + 'static,
	{
		*self.inner.listener.write() = Some(Arc::new(listener));
	}

	/// Start a transaction over `scope`.
	pub fn transaction(&self, scope: &[&str], mode: TransactionMode) -> StrataResult<Transaction> {
		if self.is_closed() {
			return Err(StrataError::InvalidState(format!(
				"connection to \"{}\" is closed",
				self.name()
			)));
		}
		if self.inner.upgrade_transaction().is_some() {
			return Err(StrataError::InvalidState(
				"a version change transaction is running on this connection".into(),
			));
		}
		if mode == TransactionMode::VersionChange {
			return Err(StrataError::Type(
				"version change transactions are only started by opening a database".into(),
			));
		}
		if scope.is_empty() {
			return Err(StrataError::InvalidAccess(
				"a transaction needs at least one object store in scope".into(),
			));
		}

		{
			let names = self.inner.store_names.read();
			if let Some(missing) = scope
				.iter()
				.find(|name| names.binary_search_by(|n| n.as_str().cmp(name)).is_err())
			{
				return Err(StrataError::NotFound(format!("no object store named \"{missing}\"")));
			}
		}

		Transaction::begin(
			Arc::clone(&self.inner),
			mode,
			scope.iter().map(|name| name.to_string()).collect(),
		)
	}

	/// Run `work` in a transaction, committing on success and aborting on error.
	pub fn run<T, F>(&self, scope: &[&str], mode: TransactionMode, work: F) -> StrataResult<T>
	where
		F: FnOnce(&Transaction) -> StrataResult<T>,
	{
		let txn = self.transaction(scope, mode)?;
		match work(&txn) {
			Ok(value) => {
				txn.commit()?;
				Ok(value)
			}
			Err(err) => {
				if txn.is_active() {
					txn.abort()?;
				}
				Err(err)
			}
		}
	}

	/// Create an object store in the running upgrade.
	pub fn create_object_store(
		&self,
		name: &str,
		params: ObjectStoreParameters,
	) -> StrataResult<ObjectStore> {
		self.require_upgrade()?.create_object_store(name, params)
	}

	/// Delete an object store in the running upgrade.
	pub fn delete_object_store(&self, name: &str) -> StrataResult<()> {
		self.require_upgrade()?.delete_object_store(name)
	}

	fn require_upgrade(&self) -> StrataResult<Transaction> {
		self.inner.upgrade_transaction().ok_or_else(|| {
			StrataError::InvalidState("schema changes need a running version change transaction".into())
		})
	}
}

impl PartialEq for Database {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for Database {}

impl fmt::Debug for Database {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Database")
			.field("name", &self.name())
			.field("storage", &self.storage())
			.field("version", &self.version())
			.field("closed", &self.is_closed())
			.finish()
	}
}
