use super::common::{factory, open};
use crate::{
	Database, ErrorKind, Factory, Key, ObjectStoreParameters, StrataError, TransactionMode,
	TransactionState, Value,
};
use pretty_assertions::assert_eq;
use std::thread;
use std::time::Duration;

fn two_store_db(factory: &Factory) -> Database {
	open(factory, "two", 1, |txn, _| {
		txn.create_object_store("b", ObjectStoreParameters::default().auto_increment())?;
		txn.create_object_store("a", ObjectStoreParameters::default().auto_increment())?;
		Ok(())
	})
}

fn count(db: &Database, store: &str) -> usize {
	let txn = db.transaction(&[store], TransactionMode::ReadOnly).unwrap();
	txn.object_store(store).unwrap().count(None).unwrap()
}

#[test]
fn test_abort_undoes_everything() {
	let factory = factory();
	let db = two_store_db(&factory);

	let txn = db.transaction(&["a"], TransactionMode::ReadWrite).unwrap();
	let store = txn.object_store("a").unwrap();
	for i in 0..10 {
		store.add(i, None).unwrap();
		if i == 4 {
			txn.abort().unwrap();
			break;
		}
	}
	assert_eq!(txn.state(), TransactionState::Aborted);
	assert_eq!(store.add(99, None).unwrap_err().kind(), ErrorKind::InvalidState);
	assert_eq!(store.count(None).unwrap_err().kind(), ErrorKind::InvalidState);

	let err = txn.abort().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::InvalidState);
	assert_eq!(txn.commit().unwrap_err().kind(), ErrorKind::InvalidState);

	assert_eq!(count(&db, "a"), 0);
	db.run(&["a"], TransactionMode::ReadWrite, |txn| {
		assert_eq!(txn.object_store("a")?.add(0, None)?, Key::from(1));
		Ok(())
	})
	.unwrap();
}

#[test]
fn test_commit_publishes_and_finishes() {
	let factory = factory();
	let db = two_store_db(&factory);

	let txn = db.transaction(&["a", "b"], TransactionMode::ReadWrite).unwrap();
	assert_eq!(txn.object_store_names(), vec!["a".to_string(), "b".to_string()]);
	txn.object_store("a").unwrap().add("x", None).unwrap();
	txn.object_store("b").unwrap().add("y", None).unwrap();
	txn.commit().unwrap();
	assert_eq!(txn.state(), TransactionState::Committed);
	assert!(!txn.is_active());
	assert_eq!(txn.object_store("a").unwrap_err().kind(), ErrorKind::InvalidState);

	assert_eq!(count(&db, "a"), 1);
	assert_eq!(count(&db, "b"), 1);
}

#[test]
fn test_dropped_transaction_commits() {
	let factory = factory();
	let db = two_store_db(&factory);

	{
		let txn = db.transaction(&["a"], TransactionMode::ReadWrite).unwrap();
		txn.object_store("a").unwrap().add("kept", None).unwrap();
	}
	assert_eq!(count(&db, "a"), 1);

	// A store handle keeps its transaction alive.
	let store = {
		let txn = db.transaction(&["a"], TransactionMode::ReadWrite).unwrap();
		txn.object_store("a").unwrap()
	};
	store.add("also kept", None).unwrap();
	drop(store);
	assert_eq!(count(&db, "a"), 2);
}

#[test]
fn test_run_aborts_on_error() {
	let factory = factory();
	let db = two_store_db(&factory);

	let err = db
		.run(&["a"], TransactionMode::ReadWrite, |txn| {
			txn.object_store("a")?.add("lost", None)?;
			Err::<(), _>(StrataError::Data("changed my mind".into()))
		})
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Data);
	assert_eq!(count(&db, "a"), 0);

	// A failed request only fails the transaction if the caller propagates it.
	let key = db
		.run(&["a"], TransactionMode::ReadWrite, |txn| {
			let store = txn.object_store("a")?;
			store.add(1, Some(Key::from(1)))?;
			assert_eq!(store.add(2, Some(Key::from(1))).unwrap_err().kind(), ErrorKind::Constraint);
			store.add(3, None)
		})
		.unwrap();
	assert_eq!(key, Key::from(2));
	assert_eq!(count(&db, "a"), 2);
}

#[test]
fn test_scope_errors() {
	let factory = factory();
	let db = two_store_db(&factory);

	let err = db.transaction(&[], TransactionMode::ReadOnly).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::InvalidAccess);
	let err = db.transaction(&["a", "zzz"], TransactionMode::ReadOnly).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::NotFound);
	let err = db.transaction(&["a"], TransactionMode::VersionChange).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Type);

	let txn = db.transaction(&["a"], TransactionMode::ReadOnly).unwrap();
	assert_eq!(txn.object_store("b").unwrap_err().kind(), ErrorKind::NotFound);
	drop(txn);

	db.close();
	let err = db.transaction(&["a"], TransactionMode::ReadOnly).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_writers_exclude_readers() {
	let factory = factory();
	let db = two_store_db(&factory);

	let writer = db.transaction(&["a"], TransactionMode::ReadWrite).unwrap();
	writer.object_store("a").unwrap().add("pending", None).unwrap();

	// Another store stays available.
	let other = db.transaction(&["b"], TransactionMode::ReadWrite).unwrap();
	other.commit().unwrap();

	let err = db.transaction(&["a"], TransactionMode::ReadOnly).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Timeout);

	let reader = {
		let db = db.clone();
		thread::spawn(move || count(&db, "a"))
	};
	thread::sleep(Duration::from_millis(20));
	writer.commit().unwrap();
	assert_eq!(reader.join().unwrap(), 1);
}

#[test]
fn test_readers_see_a_snapshot() {
	let factory = factory();
	let db = two_store_db(&factory);
	db.run(&["a"], TransactionMode::ReadWrite, |txn| {
		txn.object_store("a")?.add("first", None)?;
		Ok(())
	})
	.unwrap();

	let reader = db.transaction(&["a"], TransactionMode::ReadOnly).unwrap();
	let store = reader.object_store("a").unwrap();
	assert_eq!(store.get(Key::from(1)).unwrap(), Some(Value::from("first")));

	// Writers to other stores do not disturb the reader.
	db.run(&["b"], TransactionMode::ReadWrite, |txn| {
		txn.object_store("b")?.add("elsewhere", None)?;
		Ok(())
	})
	.unwrap();
	assert_eq!(store.count(None).unwrap(), 1);
	reader.commit().unwrap();
	assert_eq!(count(&db, "b"), 1);
}
