//! Store-directory module for the dispatch engine.
//!
//! The store directory owns store profiles; the engine only needs one fact
//! from it, the store's location, to compute driver distances.

use async_trait::async_trait;
use dispatch_types::{ConfigSchema, Coordinates, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod table;
}

/// Errors that can occur during store-directory lookups.
#[derive(Debug, Error)]
pub enum DirectoryError {
	/// Error that occurs during network communication with the directory.
	#[error("Network error: {0}")]
	Network(String),
	/// The directory answered with something that is not a store profile.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for store-directory implementations.
#[async_trait]
pub trait StoreDirectoryInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Looks up a store's location.
	///
	/// Returns `Ok(None)` when the store is unknown or has no usable
	/// coordinates on file.
	async fn get_coordinates(&self, store_id: &str)
		-> Result<Option<Coordinates>, DirectoryError>;
}

/// Type alias for store-directory factory functions.
pub type DirectoryFactory =
	fn(&toml::Value) -> Result<Box<dyn StoreDirectoryInterface>, DirectoryError>;

/// Registry trait for store-directory implementations.
pub trait DirectoryRegistry: ImplementationRegistry<Factory = DirectoryFactory> {}

/// Get all registered store-directory implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DirectoryFactory)> {
	use implementations::{http, table};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(table::Registry::NAME, table::Registry::factory()),
	]
}

/// Service wrapping the configured store-directory implementation.
pub struct DirectoryService {
	implementation: Box<dyn StoreDirectoryInterface>,
}

impl DirectoryService {
	pub fn new(implementation: Box<dyn StoreDirectoryInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_coordinates(
		&self,
		store_id: &str,
	) -> Result<Option<Coordinates>, DirectoryError> {
		self.implementation.get_coordinates(store_id).await
	}
}
