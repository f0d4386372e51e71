//! Database factory: opening, upgrading and deleting named databases

use crate::config::Config;
use crate::database::{ConnectionInner, Database, DatabaseShared, PersistenceType, VersionChangeEvent};
use crate::error::{StrataError, StrataResult};
use crate::key::Key;
use crate::storage::snapshot::decode_state;
use crate::storage::{Backend, DatabaseState, FileBackend, MemoryBackend};
use crate::transaction::{Transaction, TransactionMode, TransactionState, TxnId};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::sync::Arc;

type UpgradeCallback<'a> = Box<dyn FnOnce(&Transaction, u64) -> StrataResult<()> + 'a>;
type BlockedCallback<'a> = Box<dyn FnMut(&VersionChangeEvent) + 'a>;

/// Entry point: owns the backends and every database opened through them.
pub struct Factory {
	config: Arc<Config>,
	backend: Arc<dyn Backend>,
	/// Backs temporary databases whatever the persistent backend is.
	temporary: Arc<dyn Backend>,
	databases: DashMap<(PersistenceType, String), Arc<DatabaseShared>>,
}

impl Factory {
	/// Create a factory. With `data_dir` set, databases live in files there;
	/// otherwise they live in memory for the factory's lifetime.
	pub fn new(config: Config) -> StrataResult<Self> {
		let backend: Arc<dyn Backend> = match &config.data_dir {
			Some(dir) => {
				tracing::info!("Storing databases in {}", dir.display());
				Arc::new(FileBackend::new(dir, config.sync_on_commit)?)
			}
			None => Arc::new(MemoryBackend::new()),
		};
		Ok(Self::with_backend(config, backend))
	}

	/// Create a factory over a caller-supplied backend.
	pub fn with_backend(config: Config, backend: Arc<dyn Backend>) -> Self {
		Self {
			config: Arc::new(config),
			backend,
			temporary: Arc::new(MemoryBackend::new()),
			databases: DashMap::new(),
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Start an open request for `name`.
	pub fn open<'a>(&'a self, name: &str) -> OpenRequest<'a> {
		OpenRequest {
			factory: self,
			name: name.to_string(),
			version: None,
			storage: PersistenceType::default(),
			on_upgrade: None,
			on_blocked: None,
		}
	}

	/// Delete a persistent database, waiting for open connections to close
	/// first. Returns the version it had (0 if it did not exist).
	pub fn delete_database(&self, name: &str) -> StrataResult<u64> {
		self.delete_database_in(name, PersistenceType::Persistent)
	}

	/// Delete the database `name` of the given storage type.
	pub fn delete_database_in(&self, name: &str, storage: PersistenceType) -> StrataResult<u64> {
		let shared = self.shared(name, storage)?;
		let _open = shared.open_lock.lock();

		let old_version = shared.version();
		shared.notify_version_change(
			None,
			VersionChangeEvent {
				old_version,
				new_version: None,
			},
		);
		shared.wait_for_close(None, self.config.blocked_timeout())?;

		// Let transactions still running on closed connections finish.
		let fence = TxnId(0);
		shared
			.locks
			.acquire(fence, TransactionMode::VersionChange, &[], self.config.lock_timeout())?;
		let result = shared.erase();
		shared.locks.release_all(fence);
		result?;

		tracing::info!(
			"Deleted {} database \"{}\" (was version {})",
			storage,
			name,
			old_version
		);
		Ok(old_version)
	}

	/// Names of every persistent database, sorted.
	pub fn database_names(&self) -> StrataResult<Vec<String>> {
		let mut names = self.backend.list()?;
		names.sort();
		Ok(names)
	}

	/// Compare two keys, validating both.
	pub fn compare_keys(&self, a: &Key, b: &Key) -> StrataResult<Ordering> {
		crate::key::compare_keys(a, b)
	}

	fn backend_for(&self, storage: PersistenceType) -> &Arc<dyn Backend> {
		match storage {
			PersistenceType::Persistent => &self.backend,
			PersistenceType::Temporary => &self.temporary,
		}
	}

	fn shared(&self, name: &str, storage: PersistenceType) -> StrataResult<Arc<DatabaseShared>> {
		let id = (storage, name.to_string());
		if let Some(shared) = self.databases.get(&id) {
			return Ok(Arc::clone(shared.value()));
		}

		let backend = self.backend_for(storage);
		let state = match backend.read(name)? {
			Some(image) => {
				let state = decode_state(&image)?;
				tracing::debug!("Loaded database \"{}\" at version {}", name, state.version);
				state
			}
			None => DatabaseState::default(),
		};

		let shared = self.databases.entry(id).or_insert_with(|| {
			Arc::new(DatabaseShared::new(
				name.to_string(),
				storage,
				Arc::clone(&self.config),
				Arc::clone(backend),
				state,
			))
		});
		Ok(Arc::clone(shared.value()))
	}
}

/// Builder for [`Factory::open`].
pub struct OpenRequest<'a> {
	factory: &'a Factory,
	name: String,
	version: Option<u64>,
	storage: PersistenceType,
	on_upgrade: Option<UpgradeCallback<'a>>,
	on_blocked: Option<BlockedCallback<'a>>,
}

impl<'a> OpenRequest<'a> {
	/// Requested version. Without one, an existing database opens at its
	/// current version and a new one is created at version 1.
	pub fn version(mut self, version: u64) -> Self {
		self.version = Some(version);
		self
	}

	/// Open the persistent (default) or temporary database of this name.
	/// The two never share data or versions.
	pub fn storage(mut self, storage: PersistenceType) -> Self {
		self.storage = storage;
		self
	}

	/// Run inside the version-change transaction when the requested version
	/// is above the stored one. Receives the old version. Returning an error
	/// aborts the upgrade.
	pub fn on_upgrade<F>(mut self, callback: F) -> Self
	where
		F: FnOnce(&Transaction, u64) -> StrataResult<()> + 'a,
	{
		self.on_upgrade = Some(Box::new(callback));
		self
	}

	/// Called once if other connections are still open after being asked to
	/// close for the upgrade.
	pub fn on_blocked<F>(mut self, callback: F) -> Self
	where
		F: FnMut(&VersionChangeEvent) + 'a,
	{
		self.on_blocked = Some(Box::new(callback));
		self
	}

	pub fn execute(self) -> StrataResult<Database> {
		let OpenRequest {
			factory,
			name,
			version,
			storage,
			on_upgrade,
			mut on_blocked,
		} = self;

		if version == Some(0) {
			return Err(StrataError::Type("database version must be at least 1".into()));
		}

		let shared = factory.shared(&name, storage)?;
		let _open = shared.open_lock.lock();

		let old_version = shared.version();
		let new_version = match version {
			Some(requested) if requested < old_version => {
				return Err(StrataError::Version(format!(
					"requested version {requested} is below the stored version {old_version} of \"{name}\""
				)));
			}
			Some(requested) => requested,
			None => old_version.max(1),
		};

		if new_version == old_version {
			let connection = ConnectionInner::open(Arc::clone(&shared), old_version);
			tracing::debug!("Opened \"{}\" at version {}", name, old_version);
			return Ok(Database::from_inner(connection));
		}

		let event = VersionChangeEvent {
			old_version,
			new_version: Some(new_version),
		};
		shared.notify_version_change(None, event);
		if shared.has_open_connections(None)
			&& let Some(blocked) = on_blocked.as_mut()
		{
			blocked(&event);
		}
		shared.wait_for_close(None, factory.config.blocked_timeout())?;

		let connection = ConnectionInner::open(Arc::clone(&shared), new_version);
		let db = Database::from_inner(Arc::clone(&connection));
		upgrade(&connection, on_upgrade, old_version, new_version).inspect_err(|err| {
			tracing::info!("Upgrade of \"{}\" to version {} aborted: {}", name, new_version, err);
			db.close();
		})?;

		tracing::info!(
			"Upgraded \"{}\" from version {} to {}",
			name,
			old_version,
			new_version
		);
		Ok(db)
	}
}

/// Run the version-change transaction for a freshly opened connection.
fn upgrade(
	connection: &Arc<ConnectionInner>,
	on_upgrade: Option<UpgradeCallback<'_>>,
	old_version: u64,
	new_version: u64,
) -> StrataResult<()> {
	let txn = Transaction::begin(Arc::clone(connection), TransactionMode::VersionChange, Vec::new())?;
	txn.inner.write(|state| {
		state.version = new_version;
		Ok(())
	})?;
	connection.begin_upgrade(&txn);

	let outcome = match on_upgrade {
		Some(callback) => callback(&txn, old_version),
		None => Ok(()),
	};

	let result = match (outcome, txn.state()) {
		(Err(err), state) => {
			tracing::warn!("Upgrade callback failed: {}", err);
			if state == TransactionState::Active {
				txn.abort()?;
			}
			Err(StrataError::Abort(format!("upgrade aborted: {}", err.message())))
		}
		// The callback committed early; the new schema is already published.
		(Ok(()), TransactionState::Committed) => Ok(()),
		(Ok(()), TransactionState::Active) if connection.is_closed() => {
			txn.abort()?;
			Err(StrataError::Abort(
				"the connection closed before the upgrade finished".into(),
			))
		}
		(Ok(()), TransactionState::Active) => txn.commit(),
		(Ok(()), _) => Err(StrataError::Abort(
			"the version change transaction was aborted".into(),
		)),
	};

	// Takes the committed schema, which is the old one if the upgrade failed.
	connection.finish_upgrade();
	result
}
