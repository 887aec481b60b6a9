//! On-disk snapshot codec and atomic persistence for the address cache.

// std
use std::{
	fs,
	path::{Path, PathBuf},
};
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, addrs::endpoint::ApiEndpoint};

/// Persisted address cache snapshot.
///
/// The head of `endpoints` is the current endpoint; the tail ordering encodes
/// staleness of failure (most recently failed last).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
	/// Wall-clock timestamp of the last successful refresh; epoch-0 if never.
	pub updated_at: DateTime<Utc>,
	/// Ordered endpoint pool.
	pub endpoints: Vec<ApiEndpoint>,
}

/// Filesystem store for address cache snapshots.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
	path: PathBuf,
}
impl SnapshotStore {
	/// Create a store persisting to `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Read and decode the snapshot file.
	pub fn read(&self) -> Result<StoredSnapshot, AddressCacheError> {
		let raw = fs::read(&self.path).map_err(AddressCacheError::ReadCache)?;

		serde_json::from_slice(&raw).map_err(AddressCacheError::DecodeCache)
	}

	/// Atomically replace the snapshot file.
	///
	/// Writes to a sibling temp file and renames over the target so a crash
	/// mid-write cannot leave a partial snapshot. The parent directory is
	/// created on demand.
	pub fn write(&self, snapshot: &StoredSnapshot) -> Result<(), AddressCacheError> {
		let encoded = serde_json::to_vec_pretty(snapshot).map_err(AddressCacheError::EncodeCache)?;

		if let Some(parent) = self.path.parent()
			&& !parent.as_os_str().is_empty()
		{
			fs::create_dir_all(parent).map_err(AddressCacheError::WriteCache)?;
		}

		let temp = self.temp_path();

		fs::write(&temp, &encoded).map_err(AddressCacheError::WriteCache)?;
		fs::rename(&temp, &self.path).map_err(AddressCacheError::WriteCache)
	}

	fn temp_path(&self) -> PathBuf {
		let mut file_name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();

		file_name.push(".tmp");

		self.path.with_file_name(file_name)
	}
}

/// Read a bundled seed file: a bare sequence of endpoint records.
pub fn read_bundle(path: &Path) -> Result<Vec<ApiEndpoint>, AddressCacheError> {
	let raw = fs::read(path).map_err(AddressCacheError::ReadBundle)?;

	serde_json::from_slice(&raw).map_err(AddressCacheError::DecodeBundle)
}
