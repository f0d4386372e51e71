//! Storage layer: object store and index data, persistence backends

pub mod backend;
pub mod index;
pub mod snapshot;
pub mod store;

pub use backend::{Backend, FileBackend, MemoryBackend};
pub use index::{IndexData, IndexMeta};
pub use store::{StoreData, StoreMeta};

use crate::key::Key;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Fresh identity for a store or index instance.
pub(crate) fn next_generation() -> u64 {
	GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// True when no key can satisfy both bounds. Ordered-map range lookups
/// must not be handed such a pair.
pub(crate) fn bounds_empty(bounds: (Bound<&Key>, Bound<&Key>)) -> bool {
	match bounds {
		(Bound::Included(lo), Bound::Included(hi)) => lo > hi,
		(Bound::Included(lo), Bound::Excluded(hi))
		| (Bound::Excluded(lo), Bound::Included(hi))
		| (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
		_ => false,
	}
}

/// Committed contents of one database.
#[derive(Debug, Clone, Default)]
pub struct DatabaseState {
	pub version: u64,
	pub stores: BTreeMap<String, StoreData>,
}

impl DatabaseState {
	/// Store names in lexicographic order.
	pub fn store_names(&self) -> Vec<String> {
		self.stores.keys().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bounds_empty() {
		let one = Key::from(1);
		let two = Key::from(2);
		assert!(!bounds_empty((Bound::Included(&one), Bound::Included(&one))));
		assert!(bounds_empty((Bound::Excluded(&one), Bound::Included(&one))));
		assert!(bounds_empty((Bound::Included(&two), Bound::Included(&one))));
		assert!(!bounds_empty((Bound::Unbounded, Bound::Excluded(&one))));
	}
}
