use super::common::{factory, open};
use crate::{ErrorKind, Key, KeyRange, ObjectStoreParameters, TransactionMode, Value};
use pretty_assertions::assert_eq;
use std::cmp::Ordering;

/// Keys in ascending order across every key type.
fn ordered_keys() -> Vec<Key> {
	vec![
		Key::from(f64::NEG_INFINITY),
		Key::from(-1.7e308),
		Key::from(-10),
		Key::from(-1),
		Key::from(-0.3),
		Key::from(0),
		Key::from(1e-300),
		Key::from(0.3),
		Key::from(1),
		Key::from(1.5),
		Key::from(10),
		Key::from(1.7e308),
		Key::from(f64::INFINITY),
		Key::date(-1000.0),
		Key::date(0.0),
		Key::date(1_300_000_000_000.0),
		Key::from(""),
		Key::from("\0"),
		Key::from("1"),
		Key::from("A"),
		Key::from("a"),
		Key::from("aa"),
		Key::from("b"),
		Key::from("\u{10000}"),
		Key::from("\u{ffff}"),
		Key::binary(Vec::new()),
		Key::binary(vec![0]),
		Key::binary(vec![0, 0]),
		Key::binary(vec![255]),
		Key::from(Vec::<Key>::new()),
		Key::from(vec![Key::from(f64::NEG_INFINITY)]),
		Key::from(vec![Key::from(1)]),
		Key::from(vec![Key::from(1), Key::from(1)]),
		Key::from(vec![Key::from(2)]),
		Key::from(vec![Key::date(0.0)]),
		Key::from(vec![Key::from("")]),
		Key::from(vec![Key::from(Vec::<Key>::new())]),
		Key::from(vec![Key::from(vec![Key::from(Vec::<Key>::new())])]),
	]
}

#[test]
fn test_keys_come_back_in_order() {
	let factory = factory();
	let db = open(&factory, "keys", 1, |txn, _| {
		txn.create_object_store("store", ObjectStoreParameters::default())?;
		Ok(())
	});

	let keys = ordered_keys();
	for pair in keys.windows(2) {
		assert_eq!(pair[0].cmp(&pair[1]), Ordering::Less, "{} < {}", pair[0], pair[1]);
	}

	db.run(&["store"], TransactionMode::ReadWrite, |txn| {
		let store = txn.object_store("store")?;
		// Insert from both ends towards the middle.
		let mut shuffled = keys.clone();
		let mut i = 0;
		while !shuffled.is_empty() {
			let key = if i % 2 == 0 { shuffled.pop() } else { Some(shuffled.remove(0)) };
			if let Some(key) = key {
				store.add(Value::from(i as i64), Some(key))?;
			}
			i += 1;
		}
		Ok(())
	})
	.unwrap();

	let txn = db.transaction(&["store"], TransactionMode::ReadOnly).unwrap();
	let store = txn.object_store("store").unwrap();
	assert_eq!(store.get_all_keys(None, None).unwrap(), keys);
	assert_eq!(store.count(None).unwrap(), keys.len());

	for key in &keys {
		assert_eq!(store.get_key(key.clone()).unwrap().as_ref(), Some(key));
	}
}

#[test]
fn test_negative_zero_is_zero() {
	let factory = factory();
	let db = open(&factory, "zero", 1, |txn, _| {
		txn.create_object_store("store", ObjectStoreParameters::default())?;
		Ok(())
	});

	db.run(&["store"], TransactionMode::ReadWrite, |txn| {
		let store = txn.object_store("store")?;
		store.add("negative", Some(Key::Number(-0.0)))?;
		let err = store.add("positive", Some(Key::from(0))).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Constraint);
		assert_eq!(store.get(Key::from(0))?, Some(Value::from("negative")));
		Ok(())
	})
	.unwrap();
}

#[test]
fn test_invalid_keys_are_data_errors() {
	let factory = factory();
	let db = open(&factory, "invalid", 1, |txn, _| {
		txn.create_object_store("store", ObjectStoreParameters::default())?;
		Ok(())
	});

	let txn = db.transaction(&["store"], TransactionMode::ReadWrite).unwrap();
	let store = txn.object_store("store").unwrap();

	let invalid = [
		Key::Number(f64::NAN),
		Key::Date(f64::NAN),
		Key::Date(f64::INFINITY),
		Key::Array(vec![Key::from(1), Key::Number(f64::NAN)]),
	];
	for key in invalid {
		let err = store.put(1, Some(key.clone())).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Data, "{key:?}");
		let err = store.get(key).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Data);
	}

	for value in [Value::Null, Value::Bool(true), Value::object()] {
		assert_eq!(Key::from_value(&value).unwrap_err().kind(), ErrorKind::Data);
	}
	let nested = Value::Array(vec![Value::from(1), Value::Null]);
	assert_eq!(Key::from_value(&nested).unwrap_err().kind(), ErrorKind::Data);

	assert_eq!(store.count(None).unwrap(), 0);
}

#[test]
fn test_compare_keys() {
	let factory = factory();
	assert_eq!(
		factory.compare_keys(&Key::from(1), &Key::from("1")).unwrap(),
		Ordering::Less
	);
	assert_eq!(
		factory
			.compare_keys(&Key::from(vec![Key::from("a")]), &Key::from("a"))
			.unwrap(),
		Ordering::Greater
	);
	assert_eq!(
		factory.compare_keys(&Key::Number(-0.0), &Key::from(0)).unwrap(),
		Ordering::Equal
	);
	let err = factory
		.compare_keys(&Key::Number(f64::NAN), &Key::from(1))
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Data);
}

#[test]
fn test_range_queries() {
	let factory = factory();
	let db = open(&factory, "ranges", 1, |txn, _| {
		txn.create_object_store("store", ObjectStoreParameters::default())?;
		Ok(())
	});

	db.run(&["store"], TransactionMode::ReadWrite, |txn| {
		let store = txn.object_store("store")?;
		for i in 0..10 {
			store.add(i * 10, Some(Key::from(i)))?;
		}
		Ok(())
	})
	.unwrap();

	let txn = db.transaction(&["store"], TransactionMode::ReadOnly).unwrap();
	let store = txn.object_store("store").unwrap();

	let count = |range: KeyRange| store.count(Some(range)).unwrap();
	assert_eq!(count(KeyRange::bound(2, 5, false, false).unwrap()), 4);
	assert_eq!(count(KeyRange::bound(2, 5, true, true).unwrap()), 2);
	assert_eq!(count(KeyRange::lower_bound(7, false).unwrap()), 3);
	assert_eq!(count(KeyRange::upper_bound(7, true).unwrap()), 7);
	assert_eq!(count(KeyRange::only(3).unwrap()), 1);
	assert_eq!(count(KeyRange::lower_bound("a", false).unwrap()), 0);

	assert_eq!(
		store.get(KeyRange::lower_bound(4.5, false).unwrap()).unwrap(),
		Some(Value::from(50))
	);
	assert_eq!(
		store
			.get_all(Some(KeyRange::bound(3, 8, false, true).unwrap()), Some(2))
			.unwrap(),
		vec![Value::from(30), Value::from(40)]
	);

	assert_eq!(
		KeyRange::bound(5, 1, false, false).unwrap_err().kind(),
		ErrorKind::Data
	);
}
