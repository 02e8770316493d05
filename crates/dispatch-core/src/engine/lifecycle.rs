//! Startup and shutdown steps for the dispatch engine.

use super::{DispatchEngine, EngineError};

impl DispatchEngine {
	/// Performs any initialization required before running.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(
			service_id = %self.config.service.id,
			customer_index = self.config.orders.customer_index,
			"Initializing dispatch engine"
		);
		Ok(())
	}

	/// Drops the registrations of every channel held by this instance.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down dispatch engine");

		let held = self.hub.connection_ids();
		for connection_id in &held {
			self.connections
				.unregister(connection_id)
				.await
				.map_err(|e| EngineError::Service(e.to_string()))?;
			self.hub.detach(connection_id);
		}
		if !held.is_empty() {
			tracing::info!(channels = held.len(), "Released push channels");
		}
		Ok(())
	}
}
