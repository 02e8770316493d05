//! In-memory storage backend.
//!
//! Useful for tests and single-process deployments where persistence across
//! restarts is not required.

use crate::{ScanPage, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use dispatch_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory storage implementation.
///
/// Entries live in an ordered map so prefix scans return keys in ascending
/// order. TTL is ignored.
pub struct MemoryStorage {
	store: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(BTreeMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		_ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		new: Vec<u8>,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		match store.get_mut(key) {
			Some(current) if current.as_slice() == expected => {
				*current = new;
				Ok(true)
			},
			_ => Ok(false),
		}
	}

	async fn scan_prefix(
		&self,
		prefix: &str,
		start_after: Option<&str>,
		limit: usize,
	) -> Result<ScanPage, StorageError> {
		let store = self.store.read().await;
		let lower = match start_after {
			Some(after) if after >= prefix => Bound::Excluded(after.to_string()),
			_ => Bound::Included(prefix.to_string()),
		};

		let mut matching = store
			.range((lower, Bound::Unbounded))
			.take_while(|(k, _)| k.starts_with(prefix));

		let entries: Vec<(String, Vec<u8>)> = matching
			.by_ref()
			.take(limit)
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect();
		let has_more = matching.next().is_some();

		let last_key = if has_more {
			entries.last().map(|(k, _)| k.clone())
		} else {
			None
		};
		Ok(ScanPage { entries, last_key })
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
