//! Dispatch engine wiring and run loop.
//!
//! The engine owns the stores, the push fanout and one handler per area of
//! the lifecycle. Request-driven work happens in the handlers; the run loop
//! only keeps storage tidy until a shutdown signal arrives.

pub mod lifecycle;

use crate::handlers::{DeliveryHandler, GeomatchHandler, OrderHandler, QueryHandler};
use crate::push::{ChannelHub, PushFanout};
use crate::state::{ConnectionRegistry, HistoryStore, OrderStore, StorageConnectionRegistry};
use dispatch_config::Config;
use dispatch_directory::DirectoryService;
use dispatch_notify::NotificationService;
use dispatch_payment::PaymentService;
use dispatch_storage::StorageService;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while the engine runs.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// The order lifecycle and dispatch engine.
#[derive(Clone)]
pub struct DispatchEngine {
	pub(crate) config: Config,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) connections: Arc<dyn ConnectionRegistry>,
	pub(crate) hub: Arc<ChannelHub>,
	pub(crate) fanout: Arc<PushFanout>,
	pub(crate) order_handler: Arc<OrderHandler>,
	pub(crate) geomatch_handler: Arc<GeomatchHandler>,
	pub(crate) delivery_handler: Arc<DeliveryHandler>,
	pub(crate) query_handler: Arc<QueryHandler>,
}

impl DispatchEngine {
	/// Creates an engine over already constructed collaborator services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		directory: Arc<DirectoryService>,
		payment: Arc<PaymentService>,
		notification: Arc<NotificationService>,
	) -> Self {
		let orders = Arc::new(OrderStore::new(
			storage.clone(),
			config.orders.customer_index,
		));
		let history = Arc::new(HistoryStore::new(storage.clone()));
		let connections: Arc<dyn ConnectionRegistry> =
			Arc::new(StorageConnectionRegistry::new(storage.clone()));
		let hub = Arc::new(ChannelHub::new());
		let fanout = Arc::new(PushFanout::new(connections.clone(), hub.clone()));

		let order_handler = Arc::new(OrderHandler::new(
			orders.clone(),
			history.clone(),
			connections.clone(),
			fanout.clone(),
		));
		let geomatch_handler = Arc::new(GeomatchHandler::new(
			orders.clone(),
			directory,
			config.geomatch.clone(),
		));
		let delivery_handler = Arc::new(DeliveryHandler::new(
			orders.clone(),
			payment,
			notification,
		));
		let query_handler = Arc::new(QueryHandler::new(orders, history));

		Self {
			config,
			storage,
			connections,
			hub,
			fanout,
			order_handler,
			geomatch_handler,
			delivery_handler,
			query_handler,
		}
	}

	/// Runs until Ctrl-C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
			}
		})
		.await
	}

	/// Runs the periodic storage cleanup until `shutdown` resolves.
	pub async fn run_until<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		self.initialize().await?;

		let mut interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds.max(1),
		));
		tokio::pin!(shutdown);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					match self.storage.cleanup_expired().await {
						Ok(count) if count > 0 => {
							tracing::debug!("Storage cleanup: removed {} expired entries", count);
						}
						Err(e) => {
							tracing::warn!("Storage cleanup failed: {}", e);
						}
						_ => {}
					}
				}
				_ = &mut shutdown => {
					break;
				}
			}
		}

		self.shutdown().await
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn connections(&self) -> &Arc<dyn ConnectionRegistry> {
		&self.connections
	}

	/// Outbound queues of the push channels held by this instance.
	pub fn hub(&self) -> &Arc<ChannelHub> {
		&self.hub
	}

	pub fn fanout(&self) -> &Arc<PushFanout> {
		&self.fanout
	}

	pub fn orders(&self) -> &Arc<OrderHandler> {
		&self.order_handler
	}

	pub fn geomatch(&self) -> &Arc<GeomatchHandler> {
		&self.geomatch_handler
	}

	pub fn delivery(&self) -> &Arc<DeliveryHandler> {
		&self.delivery_handler
	}

	pub fn queries(&self) -> &Arc<QueryHandler> {
		&self.query_handler
	}
}
