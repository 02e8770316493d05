//! File-based storage backend.
//!
//! Entries live under `<storage_path>/<namespace digest>/<key digest>.bin`,
//! where the namespace is the key up to its first `:`. Both path components
//! are fixed-length SHA3-256 digests, so file names stay within filesystem
//! limits whatever the ids look like. The key itself is stored after the
//! header and read back for prefix scans. Every write (plain, conditional or
//! delete) runs under an exclusive advisory lock on `<storage_path>/.lock`,
//! which makes `compare_and_swap` atomic across tasks and processes sharing
//! the directory.

use crate::{ScanPage, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use dispatch_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey, ValidationError,
};
use fs2::FileExt;
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

const EXTENSION: &str = "bin";
const LOCK_FILE: &str = ".lock";
/// Hex characters of the namespace digest used as directory name.
const NAMESPACE_DIR_LEN: usize = 16;

fn now_secs() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

fn backend_err(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

fn digest_hex(value: &str) -> String {
	hex::encode(Sha3_256::digest(value.as_bytes()))
}

fn namespace_of(key: &str) -> &str {
	key.split_once(':').map_or(key, |(ns, _)| ns)
}

fn namespace_dir(base: &Path, namespace: &str) -> PathBuf {
	let mut name = digest_hex(namespace);
	name.truncate(NAMESPACE_DIR_LEN);
	base.join(name)
}

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header carrying the entry's expiry and key length.
///
/// Binary layout (64 bytes total):
/// - [0-3]: Magic bytes "PPDS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - [14-15]: Key length in bytes (u16, little-endian)
/// - [16-63]: Reserved
///
/// The UTF-8 key follows the header, then the payload.
#[derive(Debug, Clone, Copy)]
struct FileHeader {
	version: u16,
	expires_at: u64,
	key_len: u16,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"PPDS";
	const VERSION: u16 = 2;
	const SIZE: usize = 64;

	fn new(ttl: Duration, key_len: u16) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			now_secs().saturating_add(ttl.as_secs())
		};
		Self {
			version: Self::VERSION,
			expires_at,
			key_len,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes[14..16].copy_from_slice(&self.key_len.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(backend_err("File too small for header"));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(backend_err("Unrecognised file format"));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version != Self::VERSION {
			return Err(backend_err(format!("Unsupported file version: {}", version)));
		}

		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires_bytes),
			key_len: u16::from_le_bytes([bytes[14], bytes[15]]),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && now_secs() >= self.expires_at
	}
}

/// A live entry read back from disk.
struct StoredEntry {
	key: String,
	payload: Vec<u8>,
}

/// Decodes a stored file, treating expired entries as absent.
fn decode_file(data: &[u8]) -> Result<Option<StoredEntry>, StorageError> {
	let header = FileHeader::deserialize(data)?;
	if header.is_expired() {
		return Ok(None);
	}
	let key_end = FileHeader::SIZE + header.key_len as usize;
	if data.len() < key_end {
		return Err(backend_err("File truncated inside key"));
	}
	let key = std::str::from_utf8(&data[FileHeader::SIZE..key_end])
		.map_err(backend_err)?
		.to_string();
	Ok(Some(StoredEntry {
		key,
		payload: data[key_end..].to_vec(),
	}))
}

fn encode_file(key: &str, value: &[u8], ttl: Duration) -> Result<Vec<u8>, StorageError> {
	let key_len = u16::try_from(key.len())
		.map_err(|_| StorageError::Backend(format!("Key of {} bytes is too long", key.len())))?;
	let mut file_data = Vec::with_capacity(FileHeader::SIZE + key.len() + value.len());
	file_data.extend_from_slice(&FileHeader::new(ttl, key_len).serialize());
	file_data.extend_from_slice(key.as_bytes());
	file_data.extend_from_slice(value);
	Ok(file_data)
}

/// TTL configuration per storage namespace.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	/// Reads `ttl_<namespace>` entries from the implementation table.
	fn from_config(config: &toml::Value) -> Self {
		let mut ttls = HashMap::new();

		if let Some(table) = config.as_table() {
			for storage_key in StorageKey::all() {
				let config_key = format!("ttl_{}", storage_key.as_str());
				if let Some(secs) = table
					.get(&config_key)
					.and_then(|v| v.as_integer())
					.map(|v| v as u64)
				{
					ttls.insert(storage_key, Duration::from_secs(secs));
				}
			}
		}

		Self { ttls }
	}

	fn for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|ns| ns.parse::<StorageKey>().ok())
			.and_then(|sk| self.ttls.get(&sk).copied())
			.unwrap_or(Duration::ZERO)
	}
}

/// A write performed while holding the directory lock.
enum LockedWrite {
	Set {
		data: Vec<u8>,
	},
	Delete,
	Swap {
		expected: Vec<u8>,
		data: Vec<u8>,
	},
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: Arc<PathBuf>,
	ttl_config: TtlConfig,
}

impl FileStorage {
	/// Creates a new FileStorage instance with the specified base path and TTL config.
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path: Arc::new(base_path),
			ttl_config,
		}
	}

	fn file_path(base: &Path, key: &str) -> PathBuf {
		namespace_dir(base, namespace_of(key))
			.join(format!("{}.{}", digest_hex(key), EXTENSION))
	}

	/// Runs a write on `key` under the exclusive directory lock on a
	/// blocking thread. Returns false only when a swap's expectation did not
	/// hold.
	async fn locked_write(&self, key: &str, op: LockedWrite) -> Result<bool, StorageError> {
		let base = Arc::clone(&self.base_path);
		let path = Self::file_path(&base, key);
		let key = key.to_string();

		tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
			if let Some(dir) = path.parent() {
				std::fs::create_dir_all(dir).map_err(backend_err)?;
			}
			let lock = OpenOptions::new()
				.create(true)
				.truncate(false)
				.write(true)
				.open(base.join(LOCK_FILE))
				.map_err(backend_err)?;
			lock.lock_exclusive().map_err(backend_err)?;

			let result = match op {
				LockedWrite::Set { data } => write_atomic(&path, &data).map(|_| true),
				LockedWrite::Delete => match std::fs::remove_file(&path) {
					Ok(()) => Ok(true),
					Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
					Err(e) => Err(backend_err(e)),
				},
				LockedWrite::Swap { expected, data } => match std::fs::read(&path) {
					Ok(current) => match decode_file(&current)? {
						Some(entry) if entry.key == key && entry.payload == expected => {
							write_atomic(&path, &data).map(|_| true)
						},
						_ => Ok(false),
					},
					Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
					Err(e) => Err(backend_err(e)),
				},
			};

			FileExt::unlock(&lock).map_err(backend_err)?;
			result
		})
		.await
		.map_err(backend_err)?
	}

	/// Lists the entry files that may hold keys starting with `prefix`.
	///
	/// A prefix containing `:` names its namespace, so only that directory is
	/// listed; otherwise every namespace directory is.
	async fn candidate_files(&self, prefix: &str) -> Result<Vec<PathBuf>, StorageError> {
		let dirs = match prefix.split_once(':') {
			Some((namespace, _)) => vec![namespace_dir(&self.base_path, namespace)],
			None => list_dir(&self.base_path)
				.await?
				.into_iter()
				.filter(|p| p.is_dir())
				.collect(),
		};

		let mut files = Vec::new();
		for dir in dirs {
			files.extend(
				list_dir(&dir)
					.await?
					.into_iter()
					.filter(|p| p.extension().is_some_and(|ext| ext == EXTENSION)),
			);
		}
		Ok(files)
	}

	async fn read_live(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		let path = Self::file_path(&self.base_path, key);
		Ok(read_entry(&path)
			.await?
			.filter(|entry| entry.key == key)
			.map(|entry| entry.payload))
	}
}

async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
	let mut paths = Vec::new();
	let mut entries = match fs::read_dir(dir).await {
		Ok(entries) => entries,
		Err(e) if e.kind() == ErrorKind::NotFound => return Ok(paths),
		Err(e) => return Err(backend_err(e)),
	};
	while let Some(entry) = entries.next_entry().await.map_err(backend_err)? {
		paths.push(entry.path());
	}
	Ok(paths)
}

/// Reads one entry file. Missing files and expired entries are `None`.
async fn read_entry(path: &Path) -> Result<Option<StoredEntry>, StorageError> {
	match fs::read(path).await {
		Ok(data) => decode_file(&data),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(backend_err(e)),
	}
}

/// Writes to a sibling temp file and renames it over the target.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
	let temp_path = path.with_extension("tmp");
	std::fs::write(&temp_path, data).map_err(backend_err)?;
	std::fs::rename(&temp_path, path).map_err(backend_err)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read_live(key).await?.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let ttl = ttl.unwrap_or_else(|| self.ttl_config.for_key(key));
		let data = encode_file(key, &value, ttl)?;
		self.locked_write(key, LockedWrite::Set { data }).await?;
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.locked_write(key, LockedWrite::Delete).await?;
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.read_live(key).await?.is_some())
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		new: Vec<u8>,
	) -> Result<bool, StorageError> {
		let data = encode_file(key, &new, self.ttl_config.for_key(key))?;
		self.locked_write(
			key,
			LockedWrite::Swap {
				expected: expected.to_vec(),
				data,
			},
		)
		.await
	}

	async fn scan_prefix(
		&self,
		prefix: &str,
		start_after: Option<&str>,
		limit: usize,
	) -> Result<ScanPage, StorageError> {
		let mut matching = Vec::new();
		for path in self.candidate_files(prefix).await? {
			// Files may expire or be deleted between listing and reading
			let Some(entry) = read_entry(&path).await? else {
				continue;
			};
			if entry.key.starts_with(prefix)
				&& start_after.is_none_or(|after| entry.key.as_str() > after)
			{
				matching.push((entry.key, entry.payload));
			}
		}
		matching.sort_by(|a, b| a.0.cmp(&b.0));

		let more = matching.len() > limit;
		matching.truncate(limit);
		let last_key = if more {
			matching.last().map(|(k, _)| k.clone())
		} else {
			None
		};
		Ok(ScanPage {
			entries: matching,
			last_key,
		})
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut removed = 0;
		for path in self.candidate_files("").await? {
			let data = match fs::read(&path).await {
				Ok(data) => data,
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
					continue;
				},
			};
			let header = match FileHeader::deserialize(&data) {
				Ok(header) => header,
				Err(e) => {
					tracing::debug!("Skipping file {:?}: {}", path, e);
					continue;
				},
			};
			if !header.is_expired() {
				continue;
			}
			let key_end = FileHeader::SIZE + header.key_len as usize;
			let Some(key) = data
				.get(FileHeader::SIZE..key_end)
				.and_then(|raw| std::str::from_utf8(raw).ok())
			else {
				tracing::debug!("Skipping file {:?}: unreadable key", path);
				continue;
			};
			if let Err(e) = self.locked_write(key, LockedWrite::Delete).await {
				tracing::warn!("Failed to remove expired file {:?}: {}", path, e);
			} else {
				removed += 1;
			}
		}
		Ok(removed)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)];

		for storage_key in StorageKey::all() {
			optional_fields.push(Field::new(
				format!("ttl_{}", storage_key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}

		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
/// - `ttl_<namespace>`: TTL in seconds for `orders`, `order_by_customer`,
///   `history` or `connections` entries (default: 0, never expires)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage_in(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf(), TtlConfig::default())
	}

	#[tokio::test]
	async fn test_keys_with_separators_round_trip() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);

		storage
			.set_bytes("orders:store/1:order 7", b"x".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(
			storage.get_bytes("orders:store/1:order 7").await.unwrap(),
			b"x".to_vec()
		);

		let page = storage.scan_prefix("orders:", None, 10).await.unwrap();
		assert_eq!(page.entries.len(), 1);
		assert_eq!(page.entries[0].0, "orders:store/1:order 7");
	}

	#[tokio::test]
	async fn test_expired_entries_read_as_absent_and_are_cleaned() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);

		storage
			.set_bytes("connections:c1", b"s1".to_vec(), Some(Duration::from_secs(1)))
			.await
			.unwrap();
		storage
			.set_bytes("connections:c2", b"s1".to_vec(), None)
			.await
			.unwrap();
		assert!(storage.exists("connections:c1").await.unwrap());

		tokio::time::sleep(Duration::from_millis(2100)).await;

		assert!(!storage.exists("connections:c1").await.unwrap());
		assert!(matches!(
			storage.get_bytes("connections:c1").await,
			Err(StorageError::NotFound)
		));
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(storage.exists("connections:c2").await.unwrap());
	}

	#[tokio::test]
	async fn test_compare_and_swap() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);

		storage.set_bytes("k", b"ready".to_vec(), None).await.unwrap();
		assert!(!storage
			.compare_and_swap("k", b"pending", b"x".to_vec())
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap("k", b"ready", b"claimed".to_vec())
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"claimed".to_vec());

		storage.delete("k").await.unwrap();
		assert!(!storage
			.compare_and_swap("k", b"claimed", b"again".to_vec())
			.await
			.unwrap());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_swaps_have_one_winner() {
		let dir = TempDir::new().unwrap();
		let storage = Arc::new(storage_in(&dir));
		storage.set_bytes("slot", b"free".to_vec(), None).await.unwrap();

		let mut handles = Vec::new();
		for i in 0..8 {
			let storage = Arc::clone(&storage);
			handles.push(tokio::spawn(async move {
				storage
					.compare_and_swap("slot", b"free", format!("taken-{i}").into_bytes())
					.await
					.unwrap()
			}));
		}

		let mut winners = 0;
		for handle in handles {
			if handle.await.unwrap() {
				winners += 1;
			}
		}
		assert_eq!(winners, 1);
	}

	#[tokio::test]
	async fn test_scan_cursor() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);
		for key in ["h:c1:o1", "h:c1:o2", "h:c1:o3", "h:c2:o1"] {
			storage.set_bytes(key, Vec::new(), None).await.unwrap();
		}

		let page = storage.scan_prefix("h:c1:", None, 2).await.unwrap();
		assert_eq!(page.entries.len(), 2);
		assert_eq!(page.last_key.as_deref(), Some("h:c1:o2"));

		let page = storage
			.scan_prefix("h:c1:", page.last_key.as_deref(), 2)
			.await
			.unwrap();
		assert_eq!(page.entries.len(), 1);
		assert_eq!(page.entries[0].0, "h:c1:o3");
		assert!(page.last_key.is_none());
	}

	#[test]
	fn test_factory_rejects_bad_ttl() {
		let config: toml::Value = toml::from_str("ttl_orders = -5").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));
	}

	#[tokio::test]
	async fn test_long_uuid_keys_fit_in_file_names() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);
		let customer = "0b6f1c4e-8a51-4f0e-9d2a-3c7b9e1f5a20";
		let store = "7d2e4a91-3b6c-4e8f-a1d5-9c0b2f4e6a13";
		let order = "e4c1a9b7-2f3d-4b6e-8c5a-1d9f0e7b3a42";
		let key = format!("order_by_customer:{customer}:{store}:{order}");
		let long_key = format!("orders:{}", "x".repeat(400));

		storage.set_bytes(&key, b"idx".to_vec(), None).await.unwrap();
		storage.set_bytes(&long_key, b"big".to_vec(), None).await.unwrap();
		assert_eq!(storage.get_bytes(&key).await.unwrap(), b"idx".to_vec());
		assert_eq!(storage.get_bytes(&long_key).await.unwrap(), b"big".to_vec());

		let page = storage
			.scan_prefix(&format!("order_by_customer:{customer}:"), None, 10)
			.await
			.unwrap();
		assert_eq!(page.entries, vec![(key.clone(), b"idx".to_vec())]);

		assert!(storage
			.compare_and_swap(&key, b"idx", b"moved".to_vec())
			.await
			.unwrap());
		storage.delete(&key).await.unwrap();
		assert!(!storage.exists(&key).await.unwrap());
	}

	#[tokio::test]
	async fn test_prefix_without_namespace_scans_every_directory() {
		let dir = TempDir::new().unwrap();
		let storage = storage_in(&dir);
		for key in ["orders:s1:o1", "history:c1:s1:o1", "connections:tab"] {
			storage.set_bytes(key, Vec::new(), None).await.unwrap();
		}

		let page = storage.scan_prefix("", None, 10).await.unwrap();
		let keys: Vec<_> = page.entries.into_iter().map(|(k, _)| k).collect();
		assert_eq!(keys, vec!["connections:tab", "history:c1:s1:o1", "orders:s1:o1"]);

		let page = storage.scan_prefix("hist", None, 10).await.unwrap();
		assert_eq!(page.entries.len(), 1);
	}
}
