//! Persistence backends
//!
//! The engine hands whole database images to a [`Backend`] by name. What the
//! backend does with the bytes is its own business.

use crate::error::{StrataError, StrataResult};
use dashmap::DashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const FILE_EXTENSION: &str = "sdb";

/// Byte-oriented storage for database images.
pub trait Backend: Send + Sync {
	/// Read the image stored under `name`, if any.
	fn read(&self, name: &str) -> StrataResult<Option<Vec<u8>>>;

	/// Replace the image stored under `name`.
	fn write(&self, name: &str, bytes: &[u8]) -> StrataResult<()>;

	/// Remove the image stored under `name`. Missing images are not an error.
	fn remove(&self, name: &str) -> StrataResult<()>;

	/// Names of all stored images.
	fn list(&self) -> StrataResult<Vec<String>>;
}

/// Keeps images in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
	images: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Backend for MemoryBackend {
	fn read(&self, name: &str) -> StrataResult<Option<Vec<u8>>> {
		Ok(self.images.get(name).map(|entry| entry.value().clone()))
	}

	fn write(&self, name: &str, bytes: &[u8]) -> StrataResult<()> {
		self.images.insert(name.to_string(), bytes.to_vec());
		Ok(())
	}

	fn remove(&self, name: &str) -> StrataResult<()> {
		self.images.remove(name);
		Ok(())
	}

	fn list(&self) -> StrataResult<Vec<String>> {
		Ok(self.images.iter().map(|entry| entry.key().clone()).collect())
	}
}

/// One file per database under a data directory.
///
/// Writes go to a temporary file in the same directory which is then
/// renamed over the old image, so a crash leaves either image intact.
#[derive(Debug)]
pub struct FileBackend {
	data_dir: PathBuf,
	sync: bool,
}

impl FileBackend {
	pub fn new<P: AsRef<Path>>(data_dir: P, sync: bool) -> StrataResult<Self> {
		let data_dir = data_dir.as_ref().to_path_buf();
		fs::create_dir_all(&data_dir)?;
		Ok(Self { data_dir, sync })
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	fn path_for(&self, name: &str) -> PathBuf {
		self.data_dir
			.join(format!("{}.{FILE_EXTENSION}", escape_name(name)))
	}
}

impl Backend for FileBackend {
	fn read(&self, name: &str) -> StrataResult<Option<Vec<u8>>> {
		match fs::read(self.path_for(name)) {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	fn write(&self, name: &str, bytes: &[u8]) -> StrataResult<()> {
		let mut file = tempfile::NamedTempFile::new_in(&self.data_dir)?;
		file.write_all(bytes)?;
		if self.sync {
			file.as_file().sync_all()?;
		}
		file.persist(self.path_for(name))
			.map_err(|e| StrataError::Io(e.error))?;
		Ok(())
	}

	fn remove(&self, name: &str) -> StrataResult<()> {
		match fs::remove_file(self.path_for(name)) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	fn list(&self) -> StrataResult<Vec<String>> {
		let mut names = Vec::new();
		for entry in fs::read_dir(&self.data_dir)? {
			let path = entry?.path();
			if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
				continue;
			}
			if let Some(name) = path
				.file_stem()
				.and_then(|s| s.to_str())
				.and_then(unescape_name)
			{
				names.push(name);
			}
		}
		Ok(names)
	}
}

/// Map a database name onto a portable file stem. Alphanumerics, `-` and
/// `_` pass through; every other byte becomes `~` plus two hex digits.
fn escape_name(name: &str) -> String {
	let mut out = String::with_capacity(name.len());
	for byte in name.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
			out.push(byte as char);
		} else {
			out.push('~');
			out.push_str(&hex::encode([byte]));
		}
	}
	out
}

fn unescape_name(stem: &str) -> Option<String> {
	let mut bytes = Vec::with_capacity(stem.len());
	let mut chars = stem.bytes();
	while let Some(byte) = chars.next() {
		if byte == b'~' {
			let hi = chars.next()?;
			let lo = chars.next()?;
			let decoded = hex::decode([hi, lo]).ok()?;
			bytes.extend_from_slice(&decoded);
		} else {
			bytes.push(byte);
		}
	}
	String::from_utf8(bytes).ok()
}
