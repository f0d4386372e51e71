use crate::{
	Config, Database, Factory, IndexParameters, ObjectStoreParameters, StrataResult, Transaction,
};
use serde_json::json;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// In-memory config with short waits so blocked and timeout paths finish fast.
pub fn test_config() -> Config {
	Config {
		lock_timeout_ms: 200,
		blocked_timeout_ms: 200,
		..Config::in_memory()
	}
}

pub fn factory() -> Factory {
	init_tracing();
	Factory::new(test_config()).unwrap()
}

/// Open `name` at `version`, running `upgrade` in the version change.
pub fn open<'a, F>(factory: &'a Factory, name: &str, version: u64, upgrade: F) -> Database
where
	F: FnOnce(&Transaction, u64) -> StrataResult<()> + 'a,
{
	factory
		.open(name)
		.version(version)
		.on_upgrade(upgrade)
		.execute()
		.unwrap()
}

/// Records for the people scenario, keyed in line by ssn. Pat has no weight
/// and Mel's weight is not a valid key, so neither appears in the weight index.
pub fn people() -> Vec<serde_json::Value> {
	vec![
		json!({"ssn": "237-23-7732", "name": "Bob", "height": 60, "weight": 120}),
		json!({"ssn": "237-23-7733", "name": "Ann", "height": 52, "weight": 110}),
		json!({"ssn": "237-23-7734", "name": "Ron", "height": 73, "weight": 180}),
		json!({"ssn": "237-23-7735", "name": "Sue", "height": 58, "weight": 130}),
		json!({"ssn": "237-23-7736", "name": "Joe", "height": 65, "weight": 150}),
		json!({"ssn": "237-23-7737", "name": "Pat", "height": 65}),
		json!({"ssn": "237-23-7738", "name": "Mel", "height": 66, "weight": {}}),
		json!({"ssn": "237-23-7739", "name": "Tom", "height": 62, "weight": 140}),
	]
}

/// Database with a "people" store keyed by the "ssn" path, a non-unique
/// weight index and a unique name index, filled from [`people`].
pub fn people_db(factory: &Factory) -> Database {
	let db = open(factory, "people", 1, |txn, _| {
		let store = txn.create_object_store("people", ObjectStoreParameters::key_path("ssn"))?;
		store.create_index("weight", "weight", IndexParameters::default())?;
		store.create_index("name", "name", IndexParameters::unique())?;
		Ok(())
	});
	db.run(&["people"], crate::TransactionMode::ReadWrite, |txn| {
		let store = txn.object_store("people")?;
		for person in people() {
			store.add(person, None)?;
		}
		Ok(())
	})
	.unwrap();
	db
}
