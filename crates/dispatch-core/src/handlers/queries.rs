//! Read-only views for customers and drivers.
//!
//! Active customer orders come from the `order_by_customer` index when it is
//! enabled and readable, otherwise from a filtered scan of all orders. Both
//! paths apply the same filter and ordering.

use crate::error::{require_id, DispatchError};
use crate::state::{HistoryStore, OrderStore};
use dispatch_types::{
	truncate_id, ActiveOrderView, ActiveOrdersResponse, DeliveriesResponse, HistoryItem,
	HistoryResponse, Order, OrderStatus,
};
use std::sync::Arc;
use tracing::instrument;

/// Marker reported when the index path was bypassed.
const SCAN_FALLBACK: &str = "scan";

pub struct QueryHandler {
	orders: Arc<OrderStore>,
	history: Arc<HistoryStore>,
}

fn is_active_for(order: &Order, customer_id: &str) -> bool {
	order.customer_id == customer_id && order.status == OrderStatus::Pending
}

fn sorted_views(mut orders: Vec<Order>) -> Vec<ActiveOrderView> {
	orders.sort_by(|a, b| a.key().cmp(&b.key()));
	orders.iter().map(ActiveOrderView::from).collect()
}

impl QueryHandler {
	pub fn new(orders: Arc<OrderStore>, history: Arc<HistoryStore>) -> Self {
		Self { orders, history }
	}

	/// Pending orders of a customer.
	#[instrument(skip_all, fields(customer_id = %truncate_id(customer_id)))]
	pub async fn active_orders(
		&self,
		customer_id: &str,
	) -> Result<ActiveOrdersResponse, DispatchError> {
		require_id("customer_id", customer_id)?;

		if self.orders.customer_index_enabled() {
			match self.active_orders_indexed(customer_id).await {
				Ok(orders) => return Ok(Self::response(customer_id, orders, None)),
				Err(e) => {
					tracing::warn!(error = %e, "Customer index unavailable, falling back to scan");
				},
			}
		}

		let orders = self.active_orders_scan(customer_id).await?;
		Ok(Self::response(
			customer_id,
			orders,
			Some(SCAN_FALLBACK.to_string()),
		))
	}

	fn response(
		customer_id: &str,
		orders: Vec<ActiveOrderView>,
		fallback: Option<String>,
	) -> ActiveOrdersResponse {
		ActiveOrdersResponse {
			customer_id: customer_id.to_string(),
			count: orders.len(),
			orders,
			fallback,
		}
	}

	/// Index lookup path.
	pub async fn active_orders_indexed(
		&self,
		customer_id: &str,
	) -> Result<Vec<ActiveOrderView>, DispatchError> {
		let orders = self.orders.indexed_for_customer(customer_id).await?;
		Ok(sorted_views(
			orders
				.into_iter()
				.filter(|o| is_active_for(o, customer_id))
				.collect(),
		))
	}

	/// Full-scan path.
	pub async fn active_orders_scan(
		&self,
		customer_id: &str,
	) -> Result<Vec<ActiveOrderView>, DispatchError> {
		let orders = self
			.orders
			.scan_filtered(|o| is_active_for(o, customer_id))
			.await?;
		Ok(sorted_views(orders))
	}

	/// Items of every order the customer has had marked ready.
	pub async fn order_history(&self, customer_id: &str) -> Result<HistoryResponse, DispatchError> {
		require_id("customer_id", customer_id)?;
		let entries = self.history.list(customer_id).await?;
		Ok(HistoryResponse {
			customer_id: customer_id.to_string(),
			orders: entries.into_iter().map(HistoryItem::from).collect(),
		})
	}

	/// Orders currently in delivery with the driver.
	#[instrument(skip_all, fields(driver_id = %truncate_id(driver_id)))]
	pub async fn active_deliveries(
		&self,
		driver_id: &str,
	) -> Result<DeliveriesResponse, DispatchError> {
		require_id("driver_id", driver_id)?;
		let mut orders = self
			.orders
			.scan_filtered(|o| o.is_claimed_by(driver_id))
			.await?;
		orders.sort_by(|a, b| a.delivery_started_at.cmp(&b.delivery_started_at));

		Ok(DeliveriesResponse {
			driver_id: driver_id.to_string(),
			count: orders.len(),
			orders,
		})
	}
}
