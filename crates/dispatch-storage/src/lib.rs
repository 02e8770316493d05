//! Storage module for the dispatch engine.
//!
//! This module provides abstractions for persistent storage of orders,
//! history snapshots and push channel registrations. Backends work on raw
//! bytes; [`StorageService`] layers JSON serialization, namespaced keys,
//! optimistic conditional writes and paged prefix scans on top.

use async_trait::async_trait;
use dispatch_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// A page of raw entries returned by a prefix scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
	/// Entries in ascending key order.
	pub entries: Vec<(String, Vec<u8>)>,
	/// Key of the last returned entry when more entries follow it.
	pub last_key: Option<String>,
}

/// Trait defining the low-level interface for storage backends.
///
/// Keys are plain strings; values are opaque bytes. `compare_and_swap` must
/// be atomic with respect to every other write on the same backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key. Deleting an absent
	/// key succeeds.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Replaces the value at `key` with `new` only if the stored bytes equal
	/// `expected`. Returns false when the key is absent or holds other bytes.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		new: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Lists up to `limit` entries whose key starts with `prefix`, in
	/// ascending key order, beginning strictly after `start_after`.
	async fn scan_prefix(
		&self,
		prefix: &str,
		start_after: Option<&str>,
		limit: usize,
	) -> Result<ScanPage, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries from storage.
	/// Returns the number of entries removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// A deserialized value together with the exact bytes it was read from.
///
/// The raw bytes are the version token for [`StorageService::compare_and_swap`].
#[derive(Debug, Clone)]
pub struct Versioned<T> {
	pub value: T,
	pub raw: Vec<u8>,
}

/// A page of typed values from [`StorageService::scan`].
#[derive(Debug, Clone)]
pub struct Page<T> {
	/// `(id, value)` pairs, ids relative to the scanned namespace.
	pub items: Vec<(String, T)>,
	/// Cursor for the next page, if any.
	pub next_cursor: Option<String>,
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic serialization/deserialization. Keys are `namespace:id`.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Stores a serializable value with optional time-to-live.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes = Self::encode(data)?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a serializable value without time-to-live.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		Ok(self.retrieve_versioned(namespace, id).await?.value)
	}

	/// Retrieves a value along with the stored bytes it was decoded from.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Versioned<T>, StorageError> {
		let raw = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		let value =
			serde_json::from_slice(&raw).map_err(|e| StorageError::Serialization(e.to_string()))?;
		Ok(Versioned { value, raw })
	}

	/// Writes `data` only if the stored bytes still equal `expected.raw`.
	///
	/// Returns false when another writer changed or removed the value since
	/// it was read.
	pub async fn compare_and_swap<T: Serialize, U>(
		&self,
		namespace: &str,
		id: &str,
		expected: &Versioned<U>,
		data: &T,
	) -> Result<bool, StorageError> {
		let bytes = Self::encode(data)?;
		self.backend
			.compare_and_swap(&Self::key(namespace, id), &expected.raw, bytes)
			.await
	}

	/// Removes a value from storage. Removing an absent value succeeds.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Updates an existing value in storage.
	///
	/// Returns `NotFound` if the key doesn't exist, making it semantically
	/// different from store() which will create or overwrite.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);

		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		let bytes = Self::encode(data)?;
		self.backend.set_bytes(&key, bytes, None).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	/// Lists values in `namespace` whose id starts with `id_prefix`.
	///
	/// `cursor` is a `next_cursor` from a previous page. Entries that fail to
	/// decode are skipped with a warning.
	pub async fn scan<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id_prefix: &str,
		cursor: Option<&str>,
		limit: usize,
	) -> Result<Page<T>, StorageError> {
		let ns_prefix = format!("{}:", namespace);
		let prefix = Self::key(namespace, id_prefix);
		let start_after = cursor.map(|c| Self::key(namespace, c));

		let page = self
			.backend
			.scan_prefix(&prefix, start_after.as_deref(), limit)
			.await?;

		let mut items = Vec::with_capacity(page.entries.len());
		for (key, raw) in page.entries {
			let id = key.strip_prefix(&ns_prefix).unwrap_or(&key).to_string();
			match serde_json::from_slice(&raw) {
				Ok(value) => items.push((id, value)),
				Err(e) => {
					tracing::warn!(key = %key, error = %e, "Skipping undecodable entry");
				},
			}
		}

		let next_cursor = page
			.last_key
			.map(|k| k.strip_prefix(&ns_prefix).unwrap_or(&k).to_string());

		Ok(Page { items, next_cursor })
	}

	/// Removes expired entries from storage.
	///
	/// Returns the number of entries that were removed.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Slot {
		status: String,
		holder: Option<String>,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_compare_and_swap_detects_concurrent_writer() {
		let storage = service();
		let initial = Slot {
			status: "ready".into(),
			holder: None,
		};
		storage.store("slots", "a", &initial).await.unwrap();

		let first: Versioned<Slot> = storage.retrieve_versioned("slots", "a").await.unwrap();
		let second: Versioned<Slot> = storage.retrieve_versioned("slots", "a").await.unwrap();

		let claimed = Slot {
			status: "taken".into(),
			holder: Some("one".into()),
		};
		assert!(storage
			.compare_and_swap("slots", "a", &first, &claimed)
			.await
			.unwrap());

		let stolen = Slot {
			status: "taken".into(),
			holder: Some("two".into()),
		};
		assert!(!storage
			.compare_and_swap("slots", "a", &second, &stolen)
			.await
			.unwrap());

		let stored: Slot = storage.retrieve("slots", "a").await.unwrap();
		assert_eq!(stored, claimed);
	}

	#[tokio::test]
	async fn test_compare_and_swap_on_removed_value() {
		let storage = service();
		storage
			.store(
				"slots",
				"gone",
				&Slot {
					status: "ready".into(),
					holder: None,
				},
			)
			.await
			.unwrap();
		let seen: Versioned<Slot> = storage.retrieve_versioned("slots", "gone").await.unwrap();
		storage.remove("slots", "gone").await.unwrap();

		assert!(!storage
			.compare_and_swap("slots", "gone", &seen, &seen.value)
			.await
			.unwrap());
		assert!(!storage.exists("slots", "gone").await.unwrap());
	}

	#[tokio::test]
	async fn test_update_requires_existing_value() {
		let storage = service();
		let slot = Slot {
			status: "ready".into(),
			holder: None,
		};
		assert!(matches!(
			storage.update("slots", "missing", &slot).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_scan_pages_within_namespace() {
		let storage = service();
		for id in ["s1:o1", "s1:o2", "s1:o3", "s2:o1"] {
			storage.store("orders", id, &id.to_string()).await.unwrap();
		}
		storage.store("history", "s1:o9", &"h".to_string()).await.unwrap();

		let first: Page<String> = storage.scan("orders", "s1:", None, 2).await.unwrap();
		let ids: Vec<_> = first.items.iter().map(|(id, _)| id.as_str()).collect();
		assert_eq!(ids, vec!["s1:o1", "s1:o2"]);
		assert_eq!(first.next_cursor.as_deref(), Some("s1:o2"));

		let second: Page<String> = storage
			.scan("orders", "s1:", first.next_cursor.as_deref(), 2)
			.await
			.unwrap();
		let ids: Vec<_> = second.items.iter().map(|(id, _)| id.as_str()).collect();
		assert_eq!(ids, vec!["s1:o3"]);
		assert!(second.next_cursor.is_none());

		let all: Page<String> = storage.scan("orders", "", None, 100).await.unwrap();
		assert_eq!(all.items.len(), 4);
	}
}
