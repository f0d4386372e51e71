//! Scope locks
//!
//! Readonly transactions share their stores, readwrite transactions hold
//! their stores exclusively, and a version-change transaction holds the
//! whole database. Requests that cannot be granted wait on a condition
//! variable until a holder releases or the timeout passes.

use crate::error::{StrataError, StrataResult};
use crate::transaction::{TransactionMode, TxnId};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LockInfo {
	exclusive_holder: Option<TxnId>,
	shared_holders: HashSet<TxnId>,
}

#[derive(Debug, Default)]
struct LockTable {
	stores: HashMap<String, LockInfo>,
	database_holder: Option<TxnId>,
	holders: HashSet<TxnId>,
}

impl LockTable {
	fn can_grant(&self, txn_id: TxnId, mode: TransactionMode, scope: &[String]) -> bool {
		if self.database_holder.is_some_and(|holder| holder != txn_id) {
			return false;
		}
		match mode {
			TransactionMode::VersionChange => self.holders.iter().all(|h| *h == txn_id),
			TransactionMode::ReadWrite => scope.iter().all(|name| {
				self.stores.get(name).is_none_or(|info| {
					info.exclusive_holder.is_none_or(|h| h == txn_id)
						&& info.shared_holders.iter().all(|h| *h == txn_id)
				})
			}),
			TransactionMode::ReadOnly => scope.iter().all(|name| {
				self.stores
					.get(name)
					.is_none_or(|info| info.exclusive_holder.is_none_or(|h| h == txn_id))
			}),
		}
	}

	fn grant(&mut self, txn_id: TxnId, mode: TransactionMode, scope: &[String]) {
		self.holders.insert(txn_id);
		match mode {
			TransactionMode::VersionChange => self.database_holder = Some(txn_id),
			TransactionMode::ReadWrite => {
				for name in scope {
					self.stores.entry(name.clone()).or_default().exclusive_holder = Some(txn_id);
				}
			}
			TransactionMode::ReadOnly => {
				for name in scope {
					self.stores
						.entry(name.clone())
						.or_default()
						.shared_holders
						.insert(txn_id);
				}
			}
		}
	}
}

/// Lock manager for one database.
#[derive(Debug, Default)]
pub(crate) struct LockManager {
	table: Mutex<LockTable>,
	released: Condvar,
}

impl LockManager {
	pub fn new() -> Self {
		Self::default()
	}

	/// Acquire every lock `mode` needs over `scope`, all at once.
	pub fn acquire(
		&self,
		txn_id: TxnId,
		mode: TransactionMode,
		scope: &[String],
		timeout: Duration,
	) -> StrataResult<()> {
		let deadline = Instant::now() + timeout;
		let mut table = self.table.lock();
		while !table.can_grant(txn_id, mode, scope) {
			if self.released.wait_until(&mut table, deadline).timed_out()
				&& !table.can_grant(txn_id, mode, scope)
			{
				return Err(StrataError::Timeout(format!(
					"transaction {} could not lock {:?} within {:?}",
					txn_id.0, scope, timeout
				)));
			}
		}
		table.grant(txn_id, mode, scope);
		Ok(())
	}

	/// Release all locks held by a transaction.
	pub fn release_all(&self, txn_id: TxnId) {
		let mut table = self.table.lock();
		if !table.holders.remove(&txn_id) {
			return;
		}
		if table.database_holder == Some(txn_id) {
			table.database_holder = None;
		}
		table.stores.retain(|_, info| {
			info.shared_holders.remove(&txn_id);
			if info.exclusive_holder == Some(txn_id) {
				info.exclusive_holder = None;
			}
			!info.shared_holders.is_empty() || info.exclusive_holder.is_some()
		});
		drop(table);
		self.released.notify_all();
	}

	/// Number of transactions holding locks.
	#[cfg(test)]
	pub fn active_count(&self) -> usize {
		self.table.lock().holders.len()
	}
}
