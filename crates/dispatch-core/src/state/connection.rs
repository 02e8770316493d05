//! Registry of live push channels.

use crate::error::{require_id, DispatchError};
use crate::state::scan_all;
use async_trait::async_trait;
use dispatch_storage::{StorageError, StorageService};
use dispatch_types::{Connection, StorageKey};
use std::sync::Arc;

/// Maps push channel ids to the store they listen for.
///
/// `list_for_store` is the only lookup by store; implementations are free to
/// answer it from a scan or from a secondary index.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
	/// Registers a channel. Re-registering an id replaces its store.
	async fn register(&self, connection_id: &str, store_id: &str) -> Result<(), DispatchError>;

	/// Removes a channel. Unknown ids are ignored.
	async fn unregister(&self, connection_id: &str) -> Result<(), DispatchError>;

	/// Ids of every channel registered for the store.
	async fn list_for_store(&self, store_id: &str) -> Result<Vec<String>, DispatchError>;

	/// Store a channel is registered for, if any.
	async fn store_for(&self, connection_id: &str) -> Result<Option<String>, DispatchError>;
}

/// Registry backed by the `connections` storage namespace.
pub struct StorageConnectionRegistry {
	storage: Arc<StorageService>,
}

impl StorageConnectionRegistry {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}
}

#[async_trait]
impl ConnectionRegistry for StorageConnectionRegistry {
	async fn register(&self, connection_id: &str, store_id: &str) -> Result<(), DispatchError> {
		require_id("connection_id", connection_id)?;
		require_id("store_id", store_id)?;
		let connection = Connection::new(connection_id, store_id);
		self.storage
			.store(StorageKey::Connections.as_str(), connection_id, &connection)
			.await?;
		tracing::debug!(connection_id = %connection_id, store_id = %store_id, "Connection registered");
		Ok(())
	}

	async fn unregister(&self, connection_id: &str) -> Result<(), DispatchError> {
		self.storage
			.remove(StorageKey::Connections.as_str(), connection_id)
			.await?;
		tracing::debug!(connection_id = %connection_id, "Connection unregistered");
		Ok(())
	}

	async fn list_for_store(&self, store_id: &str) -> Result<Vec<String>, DispatchError> {
		let connections =
			scan_all::<Connection>(&self.storage, StorageKey::Connections.as_str(), "").await?;
		Ok(connections
			.into_iter()
			.filter(|(_, c)| c.store_id == store_id)
			.map(|(_, c)| c.connection_id)
			.collect())
	}

	async fn store_for(&self, connection_id: &str) -> Result<Option<String>, DispatchError> {
		match self
			.storage
			.retrieve::<Connection>(StorageKey::Connections.as_str(), connection_id)
			.await
		{
			Ok(connection) => Ok(Some(connection.store_id)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}
}
