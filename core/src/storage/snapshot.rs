//! Persisted database image
//!
//! ```text
//! +-------+-----------+-------------+------------------+
//! | SDB1  | crc32 u32 | length u64  | bincode payload  |
//! +-------+-----------+-------------+------------------+
//! ```
//!
//! Records are stored under their ordered key encoding. Index entries are
//! not stored; they are rebuilt from the records when the image is loaded.

use crate::error::{StrataError, StrataResult};
use crate::key::{decode_key, encode_key};
use crate::storage::{DatabaseState, IndexMeta, StoreData, StoreMeta};
use crate::value::Value;
use serde::{Deserialize, Serialize};

const MAGIC: &[u8; 4] = b"SDB1";
const HEADER_LEN: usize = 4 + 4 + 8;

#[derive(Debug, Serialize, Deserialize)]
struct Image {
	version: u64,
	stores: Vec<StoreImage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreImage {
	meta: StoreMeta,
	next_key: u64,
	indexes: Vec<IndexMeta>,
	records: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Serialize committed state into a checksummed image.
pub fn encode_state(state: &DatabaseState) -> StrataResult<Vec<u8>> {
	let mut stores = Vec::with_capacity(state.stores.len());
	for store in state.stores.values() {
		let records = store
			.records()
			.map(|(key, value)| Ok((encode_key(key), bincode::serialize(value)?)))
			.collect::<StrataResult<Vec<_>>>()?;
		stores.push(StoreImage {
			meta: store.meta.clone(),
			next_key: store.current_key(),
			indexes: store.index_metas(),
			records,
		});
	}

	let payload = bincode::serialize(&Image {
		version: state.version,
		stores,
	})?;

	let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
	out.extend_from_slice(MAGIC);
	out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
	out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
	out.extend_from_slice(&payload);
	Ok(out)
}

/// Load an image produced by [`encode_state`].
pub fn decode_state(bytes: &[u8]) -> StrataResult<DatabaseState> {
	if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
		return Err(StrataError::Storage("not a database image".into()));
	}

	let mut crc = [0u8; 4];
	crc.copy_from_slice(&bytes[4..8]);
	let mut len = [0u8; 8];
	len.copy_from_slice(&bytes[8..16]);
	let expected_crc = u32::from_le_bytes(crc);
	let len = u64::from_le_bytes(len) as usize;

	let payload = HEADER_LEN
		.checked_add(len)
		.and_then(|end| bytes.get(HEADER_LEN..end))
		.ok_or_else(|| StrataError::Storage("database image is truncated".into()))?;
	if crc32fast::hash(payload) != expected_crc {
		tracing::warn!("Database image failed checksum verification");
		return Err(StrataError::Storage("database image checksum mismatch".into()));
	}

	let image: Image = bincode::deserialize(payload)?;
	let mut state = DatabaseState {
		version: image.version,
		..Default::default()
	};
	for store in image.stores {
		let records = store
			.records
			.iter()
			.map(|(key, value)| Ok((decode_key(key)?, bincode::deserialize::<Value>(value)?)))
			.collect::<StrataResult<Vec<_>>>()?;
		let name = store.meta.name.clone();
		state.stores.insert(
			name,
			StoreData::restore(store.meta, store.next_key, records, store.indexes),
		);
	}
	Ok(state)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::Key;
	use crate::keypath::KeyPath;
	use crate::storage::store::WriteMode;
	use pretty_assertions::assert_eq;
	use serde_json::json;

	fn sample_state() -> DatabaseState {
		let mut store = StoreData::new(StoreMeta {
			name: "people".into(),
			key_path: Some(KeyPath::from("ssn")),
			auto_increment: false,
		});
		store
			.create_index(IndexMeta {
				name: "weight".into(),
				key_path: KeyPath::from("weight"),
				unique: false,
				multi_entry: false,
			})
			.unwrap();
		store
			.write(Value::from(json!({"ssn": "237-23-7732", "weight": 180})), None, WriteMode::Add)
			.unwrap();

		let mut counter = StoreData::new(StoreMeta {
			name: "counter".into(),
			key_path: None,
			auto_increment: true,
		});
		counter.write(Value::from("a"), None, WriteMode::Add).unwrap();
		counter.write(Value::from("b"), None, WriteMode::Add).unwrap();

		let mut state = DatabaseState {
			version: 3,
			..Default::default()
		};
		state.stores.insert("people".into(), store);
		state.stores.insert("counter".into(), counter);
		state
	}

	#[test]
	fn test_image_roundtrip() {
		let bytes = encode_state(&sample_state()).unwrap();
		let state = decode_state(&bytes).unwrap();

		assert_eq!(state.version, 3);
		assert_eq!(state.store_names(), vec!["counter".to_string(), "people".to_string()]);

		let people = &state.stores["people"];
		assert_eq!(people.index_names(), vec!["weight".to_string()]);
		assert_eq!(people.index("weight").unwrap().len(), 1);
		assert_eq!(
			people.get(&Key::from("237-23-7732")).and_then(|v| v.get("weight")),
			Some(&Value::from(180))
		);
		assert_eq!(state.stores["counter"].current_key(), 3);
	}

	#[test]
	fn test_corruption_detected() {
		let mut bytes = encode_state(&sample_state()).unwrap();
		let last = bytes.len() - 1;
		bytes[last] ^= 0xFF;
		assert!(decode_state(&bytes).is_err());

		assert!(decode_state(b"nope").is_err());
		let truncated = encode_state(&sample_state()).unwrap();
		assert!(decode_state(&truncated[..truncated.len() - 3]).is_err());
	}
}
