//! Order handler for creation, store-driven transitions and store listings.
//!
//! New orders are persisted first and then announced to the owning store's
//! live channels; a failed announcement never fails the creation. Store
//! transitions follow the fixed lifecycle: `rejected` deletes the record,
//! `ready` overwrites the status and archives the items into the customer's
//! history, `in_delivery` is the conditional claim.

use crate::error::{require_id, DispatchError};
use crate::push::PushFanout;
use crate::state::{ConnectionRegistry, HistoryStore, OrderStore};
use chrono::Utc;
use dispatch_types::{
	truncate_id, NewOrder, Order, OrderKey, OrderStatus, OrdersPageResponse, PushEvent,
	StoreRequest, TransitionResponse,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::instrument;

/// Page size for store listings when the caller sends none.
const DEFAULT_PAGE_LIMIT: usize = 50;
/// Largest page a store listing may request.
const MAX_PAGE_LIMIT: usize = 200;

pub struct OrderHandler {
	orders: Arc<OrderStore>,
	history: Arc<HistoryStore>,
	connections: Arc<dyn ConnectionRegistry>,
	fanout: Arc<PushFanout>,
}

impl OrderHandler {
	pub fn new(
		orders: Arc<OrderStore>,
		history: Arc<HistoryStore>,
		connections: Arc<dyn ConnectionRegistry>,
		fanout: Arc<PushFanout>,
	) -> Self {
		Self {
			orders,
			history,
			connections,
			fanout,
		}
	}

	/// Stores a new `pending` order and pushes it to the store.
	#[instrument(skip_all, fields(store_id = %truncate_id(&submission.store_id)))]
	pub async fn create(&self, submission: NewOrder) -> Result<Order, DispatchError> {
		require_id("store_id", &submission.store_id)?;
		require_id("customer_id", &submission.customer_id)?;
		if submission.items.is_empty() {
			return Err(DispatchError::InvalidArgument(
				"order must contain at least one item".into(),
			));
		}
		if submission.total_price < Decimal::ZERO {
			return Err(DispatchError::InvalidArgument(
				"total_price must not be negative".into(),
			));
		}
		let order_id = match submission.order_id {
			Some(id) => {
				require_id("order_id", &id)?;
				id
			},
			None => uuid::Uuid::new_v4().to_string(),
		};

		let order = Order {
			store_id: submission.store_id,
			order_id,
			customer_id: submission.customer_id,
			customer_name: submission.customer_name,
			customer_email: submission.customer_email,
			customer_location: submission.customer_location,
			total_price: submission.total_price,
			items: submission.items,
			status: OrderStatus::Pending,
			driver_id: None,
			delivery_started_at: None,
			created_at: Utc::now(),
		};

		self.orders.insert(&order).await?;
		tracing::info!(order_id = %truncate_id(&order.order_id), "Order created");

		let event = PushEvent::NewOrder {
			order: order.clone(),
		};
		if let Err(e) = self.fanout.notify(&order.store_id, &event).await {
			tracing::warn!(error = %e, "New order push failed");
		}

		Ok(order)
	}

	/// Applies a store-side status change.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), status = %target))]
	pub async fn transition(
		&self,
		store_id: &str,
		order_id: &str,
		target: OrderStatus,
		driver_id: Option<&str>,
	) -> Result<TransitionResponse, DispatchError> {
		require_id("store_id", store_id)?;
		require_id("order_id", order_id)?;
		let key = OrderKey::new(store_id, order_id);

		let removed = match target {
			OrderStatus::Pending => {
				return Err(DispatchError::InvalidArgument(
					"orders cannot be moved back to pending".into(),
				));
			},
			OrderStatus::Rejected => {
				let order = self.orders.require(&key).await?;
				self.orders.remove(&order).await?;
				tracing::info!("Order rejected and removed");
				true
			},
			OrderStatus::Ready => {
				let order = self.orders.set_status(&key, OrderStatus::Ready).await?;
				self.history.archive(&order).await?;
				tracing::info!("Order ready");
				false
			},
			OrderStatus::InDelivery => {
				let driver_id = driver_id.ok_or_else(|| {
					DispatchError::InvalidArgument("driver_id is required for in_delivery".into())
				})?;
				require_id("driver_id", driver_id)?;
				self.orders.claim(&key, driver_id).await?;
				tracing::info!(driver_id = %truncate_id(driver_id), "Order claimed");
				false
			},
		};

		Ok(TransitionResponse {
			store_id: key.store_id,
			order_id: key.order_id,
			status: target,
			removed,
		})
	}

	/// One page of a store's live orders.
	pub async fn query_by_owner(
		&self,
		store_id: &str,
		cursor: Option<&str>,
		limit: Option<usize>,
	) -> Result<OrdersPageResponse, DispatchError> {
		require_id("store_id", store_id)?;
		let limit = limit
			.unwrap_or(DEFAULT_PAGE_LIMIT)
			.clamp(1, MAX_PAGE_LIMIT);
		let page = self.orders.page_for_store(store_id, cursor, limit).await?;
		let orders: Vec<Order> = page.items.into_iter().map(|(_, order)| order).collect();

		Ok(OrdersPageResponse {
			store_id: store_id.to_string(),
			count: orders.len(),
			orders,
			next_cursor: page.next_cursor,
		})
	}

	/// Answers a request sent over a store channel on that channel only.
	#[instrument(skip_all, fields(connection_id = %truncate_id(connection_id)))]
	pub async fn handle_store_request(
		&self,
		connection_id: &str,
		request: StoreRequest,
	) -> Result<PushEvent, DispatchError> {
		let store_id = self
			.connections
			.store_for(connection_id)
			.await?
			.ok_or_else(|| DispatchError::NotFound(format!("connection {}", connection_id)))?;

		let orders = self.orders.all_for_store(&store_id).await?;
		let event = match request {
			StoreRequest::OrderList => PushEvent::OrderList { orders },
			StoreRequest::OrderCount => PushEvent::OrderCount {
				count: orders.len(),
			},
		};

		self.fanout.send_to(connection_id, &event).await?;
		Ok(event)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::push::ChannelHub;
	use crate::state::StorageConnectionRegistry;
	use crate::test_support::{items, memory_storage, new_order};

	struct Fixture {
		handler: OrderHandler,
		orders: Arc<OrderStore>,
		history: Arc<HistoryStore>,
		connections: Arc<StorageConnectionRegistry>,
		hub: Arc<ChannelHub>,
	}

	fn fixture() -> Fixture {
		let storage = memory_storage();
		let orders = Arc::new(OrderStore::new(storage.clone(), true));
		let history = Arc::new(HistoryStore::new(storage.clone()));
		let connections = Arc::new(StorageConnectionRegistry::new(storage));
		let hub = Arc::new(ChannelHub::new());
		let fanout = Arc::new(PushFanout::new(connections.clone(), hub.clone()));
		Fixture {
			handler: OrderHandler::new(
				orders.clone(),
				history.clone(),
				connections.clone(),
				fanout,
			),
			orders,
			history,
			connections,
			hub,
		}
	}

	#[tokio::test]
	async fn test_create_pushes_new_order_to_store_channels() {
		let f = fixture();
		let mut first = f.hub.attach("tab-1");
		let mut second = f.hub.attach("tab-2");
		f.connections.register("tab-1", "s1").await.unwrap();
		f.connections.register("tab-2", "s1").await.unwrap();

		let order = f.handler.create(new_order("s1", "o1", "c1")).await.unwrap();
		assert_eq!(order.status, OrderStatus::Pending);

		let expected = PushEvent::NewOrder {
			order: order.clone(),
		};
		assert_eq!(first.recv().await, Some(expected.clone()));
		assert_eq!(second.recv().await, Some(expected));
	}

	#[tokio::test]
	async fn test_create_assigns_id_and_validates() {
		let f = fixture();
		let mut submission = new_order("s1", "ignored", "c1");
		submission.order_id = None;
		let order = f.handler.create(submission).await.unwrap();
		assert!(uuid::Uuid::parse_str(&order.order_id).is_ok());

		let mut empty = new_order("s1", "o2", "c1");
		empty.items.clear();
		assert!(matches!(
			f.handler.create(empty).await,
			Err(DispatchError::InvalidArgument(_))
		));

		let mut negative = new_order("s1", "o3", "c1");
		negative.total_price = Decimal::new(-1, 0);
		assert!(matches!(
			f.handler.create(negative).await,
			Err(DispatchError::InvalidArgument(_))
		));

		assert!(matches!(
			f.handler.create(new_order("", "o4", "c1")).await,
			Err(DispatchError::InvalidArgument(_))
		));
	}

	#[tokio::test]
	async fn test_reject_deletes_without_archive() {
		let f = fixture();
		f.handler.create(new_order("s1", "o1", "c1")).await.unwrap();

		let response = f
			.handler
			.transition("s1", "o1", OrderStatus::Rejected, None)
			.await
			.unwrap();
		assert!(response.removed);
		assert!(f.orders.get(&OrderKey::new("s1", "o1")).await.unwrap().is_none());
		assert!(f.history.list("c1").await.unwrap().is_empty());

		let again = f
			.handler
			.transition("s1", "o1", OrderStatus::Rejected, None)
			.await;
		assert!(matches!(again, Err(DispatchError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_ready_twice_keeps_one_history_entry() {
		let f = fixture();
		f.handler.create(new_order("s1", "o1", "c1")).await.unwrap();

		for _ in 0..2 {
			f.handler
				.transition("s1", "o1", OrderStatus::Ready, None)
				.await
				.unwrap();
		}

		let history = f.history.list("c1").await.unwrap();
		assert_eq!(history.len(), 1);
		assert_eq!(history[0].order_id, "o1");
		assert_eq!(history[0].items, items());
	}

	#[tokio::test]
	async fn test_ready_on_missing_order_is_not_found() {
		let f = fixture();
		let result = f
			.handler
			.transition("s1", "nope", OrderStatus::Ready, None)
			.await;
		assert!(matches!(result, Err(DispatchError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_in_delivery_requires_driver() {
		let f = fixture();
		f.handler.create(new_order("s1", "o1", "c1")).await.unwrap();
		f.handler
			.transition("s1", "o1", OrderStatus::Ready, None)
			.await
			.unwrap();

		let missing = f
			.handler
			.transition("s1", "o1", OrderStatus::InDelivery, None)
			.await;
		assert!(matches!(missing, Err(DispatchError::InvalidArgument(_))));

		f.handler
			.transition("s1", "o1", OrderStatus::InDelivery, Some("d1"))
			.await
			.unwrap();
		let err = f
			.handler
			.transition("s1", "o1", OrderStatus::InDelivery, Some("d2"))
			.await
			.unwrap_err();
		assert_eq!(err.conflict_status(), Some("in_delivery"));
	}

	#[tokio::test]
	async fn test_store_request_answers_requesting_channel_only() {
		let f = fixture();
		let mut asking = f.hub.attach("tab-1");
		let mut other = f.hub.attach("tab-2");
		f.connections.register("tab-1", "s1").await.unwrap();
		f.connections.register("tab-2", "s1").await.unwrap();
		f.handler.create(new_order("s1", "o1", "c1")).await.unwrap();
		f.handler.create(new_order("s2", "o2", "c1")).await.unwrap();

		// Drain the creation pushes
		asking.recv().await.unwrap();
		other.recv().await.unwrap();

		let event = f
			.handler
			.handle_store_request("tab-1", StoreRequest::OrderCount)
			.await
			.unwrap();
		assert_eq!(event, PushEvent::OrderCount { count: 1 });
		assert_eq!(asking.recv().await, Some(PushEvent::OrderCount { count: 1 }));
		assert!(other.try_recv().is_err());

		let unknown = f
			.handler
			.handle_store_request("tab-9", StoreRequest::OrderList)
			.await;
		assert!(matches!(unknown, Err(DispatchError::NotFound(_))));
	}
}
