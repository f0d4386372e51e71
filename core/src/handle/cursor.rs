//! Cursors
//!
//! A cursor remembers only its position `(key, primary_key)`. Every move
//! seeks from that position in the transaction's working state, so records
//! written behind or ahead of the cursor during the same transaction are
//! seen the way an ordered scan would see them.
//!
//! For index cursors the traversal order is `(index key, primary key)`,
//! reversed for the `Prev` directions. The unique directions surface only
//! the lowest primary key of each index key.

use crate::error::{StrataError, StrataResult};
use crate::handle::index::Index;
use crate::handle::object_store::ObjectStore;
use crate::key::{Key, KeyRange};
use crate::storage::IndexData;
use crate::value::Value;
use std::fmt;
use std::ops::Bound;

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorDirection {
	#[default]
	Next,
	NextUnique,
	Prev,
	PrevUnique,
}

impl CursorDirection {
	pub fn is_forward(&self) -> bool {
		matches!(self, CursorDirection::Next | CursorDirection::NextUnique)
	}

	pub fn is_unique(&self) -> bool {
		matches!(self, CursorDirection::NextUnique | CursorDirection::PrevUnique)
	}
}

impl fmt::Display for CursorDirection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			CursorDirection::Next => "next",
			CursorDirection::NextUnique => "nextunique",
			CursorDirection::Prev => "prev",
			CursorDirection::PrevUnique => "prevunique",
		})
	}
}

/// What a cursor walks over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorSource {
	ObjectStore(ObjectStore),
	Index(Index),
}

#[derive(Clone)]
pub(crate) enum CursorTarget {
	Store,
	Index(Index),
}

#[derive(Debug, Clone)]
struct Position {
	key: Key,
	primary_key: Key,
	value: Option<Value>,
}

/// Where the next position may be found.
#[derive(Clone, Copy)]
struct Seek<'a> {
	/// Stay on this index key if a primary key within the bound remains.
	within: Option<(&'a Key, Bound<&'a Key>)>,
	/// Otherwise move to the nearest key past this bound.
	beyond: Bound<&'a Key>,
}

const START: Seek<'static> = Seek {
	within: None,
	beyond: Bound::Unbounded,
};

pub struct Cursor {
	store: ObjectStore,
	target: CursorTarget,
	range: KeyRange,
	direction: CursorDirection,
	key_only: bool,
	position: Option<Position>,
}

impl Cursor {
	/// Open positioned on the first entry, or `None` if the range is empty.
	pub(crate) fn open(
		store: ObjectStore,
		target: CursorTarget,
		range: KeyRange,
		direction: CursorDirection,
		key_only: bool,
	) -> StrataResult<Option<Self>> {
		let mut cursor = Self {
			store,
			target,
			range,
			direction,
			key_only,
			position: None,
		};
		cursor.position = cursor.locate(START)?;
		Ok(cursor.position.is_some().then_some(cursor))
	}

	// Accessors

	/// Current key (the index key for index cursors). `None` once exhausted.
	pub fn key(&self) -> Option<&Key> {
		self.position.as_ref().map(|p| &p.key)
	}

	pub fn primary_key(&self) -> Option<&Key> {
		self.position.as_ref().map(|p| &p.primary_key)
	}

	/// Current record. `None` for key cursors and once exhausted.
	pub fn value(&self) -> Option<&Value> {
		self.position.as_ref().and_then(|p| p.value.as_ref())
	}

	pub fn direction(&self) -> CursorDirection {
		self.direction
	}

	pub fn is_key_only(&self) -> bool {
		self.key_only
	}

	pub fn is_exhausted(&self) -> bool {
		self.position.is_none()
	}

	pub fn source(&self) -> CursorSource {
		match &self.target {
			CursorTarget::Store => CursorSource::ObjectStore(self.store.clone()),
			CursorTarget::Index(index) => CursorSource::Index(index.clone()),
		}
	}

	// Movement

	/// Move to the next entry in direction, or to the first entry at or past
	/// `target`. Returns `false` once the cursor runs off the end.
	pub fn continue_cursor(&mut self, target: Option<Key>) -> StrataResult<bool> {
		let current = self.current()?;
		let next = match &target {
			None => self.locate(self.step_from(current))?,
			Some(target) => {
				target.validate()?;
				let ahead = if self.direction.is_forward() {
					target > &current.key
				} else {
					target < &current.key
				};
				if !ahead {
					return Err(StrataError::InvalidState(format!(
						"cannot continue {} to {target} from {}",
						self.direction, current.key
					)));
				}
				self.locate(Seek {
					within: None,
					beyond: Bound::Included(target),
				})?
			}
		};
		self.position = next;
		Ok(self.position.is_some())
	}

	/// Shorthand for `continue_cursor(Some(target))`.
	pub fn continue_to(&mut self, target: impl Into<Key>) -> StrataResult<bool> {
		self.continue_cursor(Some(target.into()))
	}

	/// Move to the first entry at or past `(key, primary_key)`. Index cursors
	/// in the `Next` and `Prev` directions only.
	pub fn continue_primary_key(
		&mut self,
		key: impl Into<Key>,
		primary_key: impl Into<Key>,
	) -> StrataResult<bool> {
		if matches!(self.target, CursorTarget::Store) || self.direction.is_unique() {
			return Err(StrataError::InvalidAccess(
				"continue_primary_key needs an index cursor in next or prev direction".into(),
			));
		}
		let (key, primary_key) = (key.into(), primary_key.into());
		key.validate()?;
		primary_key.validate()?;

		let current = self.current()?;
		let order = key
			.cmp(&current.key)
			.then_with(|| primary_key.cmp(&current.primary_key));
		let ahead = if self.direction.is_forward() {
			order.is_gt()
		} else {
			order.is_lt()
		};
		if !ahead {
			return Err(StrataError::InvalidState(format!(
				"cannot continue {} to ({key}, {primary_key}) from ({}, {})",
				self.direction, current.key, current.primary_key
			)));
		}

		self.position = self.locate(Seek {
			within: Some((&key, Bound::Included(&primary_key))),
			beyond: Bound::Excluded(&key),
		})?;
		Ok(self.position.is_some())
	}

	/// Step `count` times, honouring unique folding.
	pub fn advance(&mut self, count: u32) -> StrataResult<bool> {
		if count == 0 {
			return Err(StrataError::Type("advance count must be greater than zero".into()));
		}
		self.current()?;
		for _ in 0..count {
			let Some(current) = self.position.as_ref() else {
				break;
			};
			self.position = self.locate(self.step_from(current))?;
		}
		Ok(self.position.is_some())
	}

	// Writes

	/// Replace the current record. The primary key cannot change.
	pub fn update(&mut self, value: impl Into<Value>) -> StrataResult<Key> {
		let value = value.into();
		let cached = value.clone();
		let primary_key = self.store.write(|store| {
			let position = self.writable()?;
			store.update_at(&position.primary_key, value)?;
			Ok(position.primary_key.clone())
		})?;
		if let Some(position) = self.position.as_mut() {
			position.value = Some(cached);
		}
		Ok(primary_key)
	}

	/// Delete the current record. The cursor stays where it is.
	pub fn delete(&mut self) -> StrataResult<()> {
		self.store.write(|store| {
			let position = self.writable()?;
			store.delete(&KeyRange::from(position.primary_key.clone()));
			Ok(())
		})
	}

	fn writable(&self) -> StrataResult<&Position> {
		let position = self.current()?;
		if self.key_only {
			return Err(StrataError::InvalidState(
				"a key cursor cannot modify records".into(),
			));
		}
		Ok(position)
	}

	fn current(&self) -> StrataResult<&Position> {
		self.position
			.as_ref()
			.ok_or_else(|| StrataError::InvalidState("cursor is exhausted".into()))
	}

	fn step_from<'a>(&self, current: &'a Position) -> Seek<'a> {
		Seek {
			within: (!self.direction.is_unique())
				.then_some((&current.key, Bound::Excluded(&current.primary_key))),
			beyond: Bound::Excluded(&current.key),
		}
	}

	fn locate(&self, seek: Seek<'_>) -> StrataResult<Option<Position>> {
		let forward = self.direction.is_forward();
		self.store.read(|store| {
			let found = match &self.target {
				CursorTarget::Store => {
					let key = if forward {
						store.first_key(&self.range, seek.beyond)
					} else {
						store.last_key(&self.range, seek.beyond)
					};
					key.map(|key| (key.clone(), key.clone()))
				}
				CursorTarget::Index(index) => self.locate_in_index(index.resolve(store)?, seek),
			};

			Ok(found.map(|(key, primary_key)| {
				let value = if self.key_only {
					None
				} else {
					store.get(&primary_key).cloned()
				};
				Position {
					key,
					primary_key,
					value,
				}
			}))
		})
	}

	fn locate_in_index(&self, index: &IndexData, seek: Seek<'_>) -> Option<(Key, Key)> {
		let forward = self.direction.is_forward();

		if let Some((key, bound)) = seek.within
			&& self.range.includes(key)
		{
			let primary = if forward {
				index.first_primary(key, bound)
			} else {
				index.last_primary(key, bound)
			};
			if let Some(primary) = primary {
				return Some((key.clone(), primary.clone()));
			}
		}

		let key = if forward {
			index.first_key(&self.range, seek.beyond)
		} else {
			index.last_key(&self.range, seek.beyond)
		}?;
		let primary = match self.direction {
			CursorDirection::Prev => index.last_primary(key, Bound::Unbounded),
			_ => index.first_primary(key, Bound::Unbounded),
		}?;
		Some((key.clone(), primary.clone()))
	}
}

impl fmt::Debug for Cursor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Cursor")
			.field("store", &self.store.name())
			.field("direction", &self.direction)
			.field("key", &self.key())
			.field("primary_key", &self.primary_key())
			.finish()
	}
}
