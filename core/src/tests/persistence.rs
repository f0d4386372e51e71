use super::common::init_tracing;
use crate::{
	Config, CursorDirection, ErrorKind, Factory, IndexParameters, Key, ObjectStoreParameters,
	TransactionMode, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn file_factory(dir: &Path) -> Factory {
	init_tracing();
	Factory::new(Config {
		lock_timeout_ms: 200,
		blocked_timeout_ms: 200,
		sync_on_commit: false,
		..Config::with_data_dir(dir)
	})
	.unwrap()
}

#[test]
fn test_reopen_keeps_everything() {
	let dir = tempdir().unwrap();

	{
		let factory = file_factory(dir.path());
		let db = factory
			.open("library")
			.version(2)
			.on_upgrade(|txn, _| {
				let books = txn.create_object_store(
					"books",
					ObjectStoreParameters::key_path("isbn").auto_increment(),
				)?;
				books.create_index("author", "author", IndexParameters::default())?;
				books.create_index("tags", "tags", IndexParameters::multi_entry())?;
				Ok(())
			})
			.execute()
			.unwrap();

		db.run(&["books"], TransactionMode::ReadWrite, |txn| {
			let books = txn.object_store("books")?;
			books.add(json!({"author": "Le Guin", "tags": ["sf", "classic"]}), None)?;
			books.add(json!({"author": "Banks", "tags": ["sf"]}), None)?;
			books.add(json!({"isbn": 100, "author": "Le Guin"}), None)?;
			Ok(())
		})
		.unwrap();

		// Aborted work never reaches the file.
		let txn = db.transaction(&["books"], TransactionMode::ReadWrite).unwrap();
		txn.object_store("books").unwrap().clear().unwrap();
		txn.abort().unwrap();
	}

	let factory = file_factory(dir.path());
	assert_eq!(factory.database_names().unwrap(), vec!["library".to_string()]);

	let db = factory.open("library").execute().unwrap();
	assert_eq!(db.version(), 2);
	assert_eq!(db.object_store_names(), vec!["books".to_string()]);

	let txn = db.transaction(&["books"], TransactionMode::ReadWrite).unwrap();
	let books = txn.object_store("books").unwrap();
	assert_eq!(books.count(None).unwrap(), 3);
	assert_eq!(books.index_names(), vec!["author".to_string(), "tags".to_string()]);
	assert!(books.auto_increment());

	let author = books.index("author").unwrap();
	assert_eq!(
		author.get_all_keys(Some(Key::from("Le Guin").into()), None).unwrap(),
		vec![Key::from(1), Key::from(100)]
	);
	let tags = books.index("tags").unwrap();
	assert_eq!(tags.count(Some(Key::from("sf").into())).unwrap(), 2);

	let mut cursor = author
		.open_cursor(None, CursorDirection::PrevUnique)
		.unwrap()
		.unwrap();
	assert_eq!(cursor.key(), Some(&Key::from("Le Guin")));
	assert!(cursor.continue_cursor(None).unwrap());
	assert_eq!(
		cursor.value().and_then(|v| v.get("author")).and_then(Value::as_str),
		Some("Banks")
	);

	// The generator resumes past the largest numeric key.
	let key = books.add(json!({"author": "Jemisin"}), None).unwrap();
	assert_eq!(key, Key::from(101));
}

#[test]
fn test_schema_only_upgrade_is_persisted() {
	let dir = tempdir().unwrap();
	{
		let factory = file_factory(dir.path());
		factory
			.open("empty")
			.version(7)
			.on_upgrade(|txn, _| {
				txn.create_object_store("a", ObjectStoreParameters::default())?;
				Ok(())
			})
			.execute()
			.unwrap();
	}

	let factory = file_factory(dir.path());
	let db = factory
		.open("empty")
		.version(7)
		.on_upgrade(|_, _| panic!("already at version 7"))
		.execute()
		.unwrap();
	assert_eq!(db.object_store_names(), vec!["a".to_string()]);
	let err = factory.open("empty").version(6).execute().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Version);
}

#[test]
fn test_delete_database_removes_file() {
	let dir = tempdir().unwrap();
	let factory = file_factory(dir.path());

	let db = factory
		.open("scratch pad")
		.version(1)
		.on_upgrade(|txn, _| {
			txn.create_object_store("notes", ObjectStoreParameters::default())?;
			Ok(())
		})
		.execute()
		.unwrap();
	db.close();

	let files = || fs::read_dir(dir.path()).unwrap().count();
	assert_eq!(files(), 1);
	assert_eq!(factory.delete_database("scratch pad").unwrap(), 1);
	assert_eq!(files(), 0);
	assert!(factory.database_names().unwrap().is_empty());

	drop(factory);
	let factory = file_factory(dir.path());
	let db = factory.open("scratch pad").execute().unwrap();
	assert_eq!(db.version(), 1);
	assert!(db.object_store_names().is_empty());
}

#[test]
fn test_corrupt_image_is_reported() {
	let dir = tempdir().unwrap();
	{
		let factory = file_factory(dir.path());
		factory.open("fragile").execute().unwrap();
	}

	let path = fs::read_dir(dir.path())
		.unwrap()
		.next()
		.unwrap()
		.unwrap()
		.path();
	let mut bytes = fs::read(&path).unwrap();
	let last = bytes.len() - 1;
	bytes[last] ^= 0xff;
	fs::write(&path, bytes).unwrap();

	let factory = file_factory(dir.path());
	let err = factory.open("fragile").execute().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Storage);
}
