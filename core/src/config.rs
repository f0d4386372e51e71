//! Engine configuration

use crate::error::{StrataError, StrataResult};
use serde::{Deserialize, Serialize};
use std::{
	env, fs,
	path::{Path, PathBuf},
	time::Duration,
};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
	/// Directory for database images. `None` keeps everything in memory.
	pub data_dir: Option<PathBuf>,
	/// Maximum wait for transaction scope locks (default: 5s)
	pub lock_timeout_ms: u64,
	/// Maximum wait for other connections to close before an upgrade or delete (default: 5s)
	pub blocked_timeout_ms: u64,
	/// Whether to fsync each image written on commit (default: true)
	pub sync_on_commit: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			data_dir: None,
			lock_timeout_ms: 5_000,
			blocked_timeout_ms: 5_000,
			sync_on_commit: true, // Prioritize durability
		}
	}
}

impl Config {
	/// In-memory configuration.
	pub fn in_memory() -> Self {
		Self::default()
	}

	/// File-backed configuration rooted at `dir`.
	pub fn with_data_dir<P: AsRef<Path>>(dir: P) -> Self {
		Self {
			data_dir: Some(dir.as_ref().to_path_buf()),
			..Self::default()
		}
	}

	pub fn lock_timeout(&self) -> Duration {
		Duration::from_millis(self.lock_timeout_ms)
	}

	pub fn blocked_timeout(&self) -> Duration {
		Duration::from_millis(self.blocked_timeout_ms)
	}

	/// Parse a TOML config file.
	pub fn from_file<P: AsRef<Path>>(path: P) -> StrataResult<Self> {
		let contents = fs::read_to_string(path.as_ref())?;
		Self::from_toml(&contents)
	}

	pub fn from_toml(contents: &str) -> StrataResult<Self> {
		toml::from_str(contents)
			.map_err(|e| StrataError::Storage(format!("Failed to parse config: {}", e)))
	}

	/// Load config from a TOML file if one is given and exists, then apply
	/// environment overrides. Falls back to defaults when the file is missing.
	pub fn load(path: Option<&Path>) -> StrataResult<Self> {
		let mut cfg = match path {
			Some(path) => match Self::from_file(path) {
				Ok(cfg) => cfg,
				Err(StrataError::Io(_)) if !path.exists() => Self::default(),
				Err(e) => return Err(e),
			},
			None => Self::default(),
		};
		cfg.apply_env();
		Ok(cfg)
	}

	/// Apply STRATA_* environment variable overrides.
	pub fn apply_env(&mut self) {
		self.apply_overrides(|name| env::var(name).ok());
	}

	fn apply_overrides<F>(&mut self, lookup: F)
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(v) = lookup("STRATA_DATA_DIR") {
			self.data_dir = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
		}

		if let Some(v) = lookup("STRATA_LOCK_TIMEOUT_MS")
			&& let Ok(ms) = v.parse::<u64>()
		{
			self.lock_timeout_ms = ms;
		}

		if let Some(v) = lookup("STRATA_BLOCKED_TIMEOUT_MS")
			&& let Ok(ms) = v.parse::<u64>()
		{
			self.blocked_timeout_ms = ms;
		}

		if let Some(v) = lookup("STRATA_SYNC_ON_COMMIT")
			&& let Ok(sync) = v.parse::<bool>()
		{
			self.sync_on_commit = sync;
		}
	}
}
