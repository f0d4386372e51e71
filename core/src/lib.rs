//! StrataDB - embedded, transactional, versioned object store
//!
//! Databases hold named object stores of [`Value`] records ordered by
//! [`Key`], with secondary indexes, cursors and snapshot-isolated
//! transactions. Schema changes happen only inside the version-change
//! transaction that opening a database at a higher version starts.
//!
//! ```rust
//! use strata_core::{
//!     Config, CursorDirection, Factory, IndexParameters, Key, KeyRange, ObjectStoreParameters,
//!     TransactionMode, Value,
//! };
//! use serde_json::json;
//!
//! let factory = Factory::new(Config::in_memory()).unwrap();
//! let db = factory
//!     .open("people")
//!     .version(1)
//!     .on_upgrade(|txn, _old| {
//!         let store = txn.create_object_store("people", ObjectStoreParameters::key_path("ssn"))?;
//!         store.create_index("weight", "weight", IndexParameters::default())?;
//!         Ok(())
//!     })
//!     .execute()
//!     .unwrap();
//!
//! db.run(&["people"], TransactionMode::ReadWrite, |txn| {
//!     let people = txn.object_store("people")?;
//!     people.add(Value::from(json!({"ssn": "1", "weight": 60})), None)?;
//!     people.add(Value::from(json!({"ssn": "2", "weight": 80})), None)?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! let txn = db.transaction(&["people"], TransactionMode::ReadOnly).unwrap();
//! let weight = txn.object_store("people").unwrap().index("weight").unwrap();
//! let light = KeyRange::upper_bound(70, true).unwrap();
//! assert_eq!(weight.count(Some(light.clone())).unwrap(), 1);
//!
//! let cursor = weight.open_cursor(Some(light), CursorDirection::Next).unwrap().unwrap();
//! assert_eq!(cursor.primary_key(), Some(&Key::from("1")));
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod factory;
pub mod handle;
pub mod key;
pub mod keypath;
pub mod storage;
pub mod transaction;
pub mod value;

pub use config::Config;
pub use database::{Database, PersistenceType, VersionChangeEvent};
pub use error::{ErrorKind, StrataError, StrataResult};
pub use factory::{Factory, OpenRequest};
pub use handle::{
	Cursor, CursorDirection, CursorSource, Index, IndexParameters, ObjectStore,
	ObjectStoreParameters,
};
pub use key::{Key, KeyRange, compare_keys};
pub use keypath::KeyPath;
pub use transaction::{Transaction, TransactionMode, TransactionState, TxnId};
pub use value::Value;

#[cfg(test)]
mod tests;
