//! Best-effort push of order events to store clients.
//!
//! The order store stays the source of truth; a store that misses a push
//! catches up by listing its orders. Delivery is therefore fire-once per
//! live channel with no acknowledgement or retry.

pub mod hub;

pub use hub::ChannelHub;

use crate::error::DispatchError;
use crate::state::ConnectionRegistry;
use async_trait::async_trait;
use dispatch_types::{truncate_id, PushEvent};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors raised while delivering to a single channel.
#[derive(Debug, Error)]
pub enum PushError {
	/// The channel is gone; its registration should be dropped.
	#[error("Channel closed: {0}")]
	Closed(String),
	/// The channel is not held by this instance. Another instance sharing
	/// the registry may own it, so its registration stays.
	#[error("Channel not held here: {0}")]
	NotHeld(String),
	#[error("Delivery failed: {0}")]
	Delivery(String),
}

/// Transport that carries events to one channel.
#[async_trait]
pub trait PushTransport: Send + Sync {
	async fn deliver(&self, connection_id: &str, event: &PushEvent) -> Result<(), PushError>;
}

/// Delivers events to every channel registered for a store.
pub struct PushFanout {
	registry: Arc<dyn ConnectionRegistry>,
	transport: Arc<dyn PushTransport>,
}

impl PushFanout {
	pub fn new(registry: Arc<dyn ConnectionRegistry>, transport: Arc<dyn PushTransport>) -> Self {
		Self {
			registry,
			transport,
		}
	}

	/// Pushes `event` to all of the store's channels concurrently.
	///
	/// Returns the number of channels that accepted the event. Channels that
	/// fail are unregistered and channels held elsewhere are skipped; neither
	/// fails the call.
	#[instrument(skip_all, fields(store_id = %truncate_id(store_id), action = event.action()))]
	pub async fn notify(&self, store_id: &str, event: &PushEvent) -> Result<usize, DispatchError> {
		let connections = self.registry.list_for_store(store_id).await?;
		if connections.is_empty() {
			tracing::debug!("No live channels");
			return Ok(0);
		}

		let deliveries = connections.iter().map(|connection_id| async move {
			(
				connection_id,
				self.transport.deliver(connection_id, event).await,
			)
		});

		let mut delivered = 0;
		let mut elsewhere = 0;
		for (connection_id, result) in join_all(deliveries).await {
			match result {
				Ok(()) => delivered += 1,
				Err(PushError::NotHeld(_)) => elsewhere += 1,
				Err(e) => self.drop_channel(connection_id, &e).await,
			}
		}

		tracing::debug!(
			delivered,
			elsewhere,
			total = connections.len(),
			"Fanout complete"
		);
		Ok(delivered)
	}

	/// Pushes `event` to a single channel.
	pub async fn send_to(&self, connection_id: &str, event: &PushEvent) -> Result<(), DispatchError> {
		if let Err(e) = self.transport.deliver(connection_id, event).await {
			if !matches!(e, PushError::NotHeld(_)) {
				self.drop_channel(connection_id, &e).await;
			}
			return Err(DispatchError::NotFound(format!(
				"connection {}",
				connection_id
			)));
		}
		Ok(())
	}

	async fn drop_channel(&self, connection_id: &str, cause: &PushError) {
		tracing::warn!(
			connection_id = %truncate_id(connection_id),
			error = %cause,
			"Push delivery failed, dropping channel"
		);
		if let Err(e) = self.registry.unregister(connection_id).await {
			tracing::warn!(
				connection_id = %truncate_id(connection_id),
				error = %e,
				"Failed to unregister channel"
			);
		}
	}
}
