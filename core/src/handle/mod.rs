//! Handles to object stores, indexes and cursors
//!
//! Handles are tied to the transaction that created them. Each one records
//! the generation of the store or index it was opened on, so a handle whose
//! target was deleted (or deleted and recreated under the same name) fails
//! with `InvalidStateError` instead of reaching the new object.

pub mod cursor;
pub mod index;
pub mod object_store;

pub use cursor::{Cursor, CursorDirection, CursorSource};
pub use index::{Index, IndexParameters};
pub use object_store::{ObjectStore, ObjectStoreParameters};

use crate::error::{StrataError, StrataResult};
use crate::key::KeyRange;

/// Validate an optional query, defaulting to every key.
pub(crate) fn query_range(range: Option<KeyRange>) -> StrataResult<KeyRange> {
	let range = range.unwrap_or_default();
	range.validate()?;
	Ok(range)
}

/// `None` and `Some(0)` both mean no limit.
pub(crate) fn limit(count: Option<u32>) -> usize {
	match count {
		None | Some(0) => usize::MAX,
		Some(n) => n as usize,
	}
}

pub(crate) fn deleted(what: &str, name: &str) -> StrataError {
	StrataError::InvalidState(format!("{what} \"{name}\" has been deleted"))
}
