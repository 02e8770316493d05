//! Order store and lifecycle state machine.
//!
//! Orders live in the `orders` namespace under `store_id:order_id`. Status
//! changes are unconditional overwrites except the claim into `in_delivery`,
//! which is an optimistic compare-and-swap on the exact bytes that were read
//! while the order was `ready`; at most one concurrent claim can win.

use crate::error::DispatchError;
use crate::state::scan_all;
use chrono::Utc;
use dispatch_storage::{Page, StorageError, StorageService, Versioned};
use dispatch_types::{Order, OrderKey, OrderStatus, StorageKey};
use std::sync::Arc;

/// Persistent record of live orders.
pub struct OrderStore {
	storage: Arc<StorageService>,
	/// Whether `order_by_customer` entries are maintained on create.
	customer_index: bool,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>, customer_index: bool) -> Self {
		Self {
			storage,
			customer_index,
		}
	}

	pub fn customer_index_enabled(&self) -> bool {
		self.customer_index
	}

	fn index_id(customer_id: &str, key: &OrderKey) -> String {
		format!("{}:{}:{}", customer_id, key.store_id, key.order_id)
	}

	/// Writes a new order record.
	///
	/// The index entry goes first: an entry without an order is pruned on
	/// read, an order without an entry would be invisible on the index path.
	pub async fn insert(&self, order: &Order) -> Result<(), DispatchError> {
		let key = order.key();
		if self.customer_index {
			self.storage
				.store(
					StorageKey::OrderByCustomer.as_str(),
					&Self::index_id(&order.customer_id, &key),
					&key,
				)
				.await?;
		}
		self.storage
			.store(StorageKey::Orders.as_str(), &key.storage_id(), order)
			.await?;
		Ok(())
	}

	/// Returns the order, or `None` if no record exists.
	pub async fn get(&self, key: &OrderKey) -> Result<Option<Order>, DispatchError> {
		match self
			.storage
			.retrieve::<Order>(StorageKey::Orders.as_str(), &key.storage_id())
			.await
		{
			Ok(order) => Ok(Some(order)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Returns the order or `NotFound`.
	pub async fn require(&self, key: &OrderKey) -> Result<Order, DispatchError> {
		self.get(key)
			.await?
			.ok_or_else(|| DispatchError::NotFound(format!("order {}", key)))
	}

	/// Overwrites the status of an existing order.
	///
	/// Any status other than `in_delivery` drops the driver assignment.
	pub async fn set_status(
		&self,
		key: &OrderKey,
		status: OrderStatus,
	) -> Result<Order, DispatchError> {
		let mut order = self.require(key).await?;
		order.status = status;
		if status != OrderStatus::InDelivery {
			order.driver_id = None;
			order.delivery_started_at = None;
		}

		match self
			.storage
			.update(StorageKey::Orders.as_str(), &key.storage_id(), &order)
			.await
		{
			Ok(()) => Ok(order),
			Err(StorageError::NotFound) => Err(DispatchError::NotFound(format!("order {}", key))),
			Err(e) => Err(e.into()),
		}
	}

	/// Moves a `ready` order into `in_delivery` for `driver_id`.
	///
	/// Fails with `Conflict` carrying the status observed after the failed
	/// attempt, or `None` when the order does not exist.
	pub async fn claim(&self, key: &OrderKey, driver_id: &str) -> Result<Order, DispatchError> {
		let id = key.storage_id();
		let seen: Versioned<Order> = match self
			.storage
			.retrieve_versioned(StorageKey::Orders.as_str(), &id)
			.await
		{
			Ok(seen) => seen,
			Err(StorageError::NotFound) => return Err(self.conflict(key, None)),
			Err(e) => return Err(e.into()),
		};

		if seen.value.status != OrderStatus::Ready {
			return Err(self.conflict(key, Some(seen.value.status)));
		}

		let mut claimed = seen.value.clone();
		claimed.status = OrderStatus::InDelivery;
		claimed.driver_id = Some(driver_id.to_string());
		claimed.delivery_started_at = Some(Utc::now());

		if self
			.storage
			.compare_and_swap(StorageKey::Orders.as_str(), &id, &seen, &claimed)
			.await?
		{
			return Ok(claimed);
		}

		// Lost the race; report what the winner left behind
		let current = self.get(key).await?.map(|o| o.status);
		Err(self.conflict(key, current))
	}

	fn conflict(&self, key: &OrderKey, current_status: Option<OrderStatus>) -> DispatchError {
		DispatchError::Conflict {
			order_id: key.order_id.clone(),
			current_status,
		}
	}

	/// Deletes the order record and its customer index entry.
	pub async fn remove(&self, order: &Order) -> Result<(), DispatchError> {
		let key = order.key();
		self.storage
			.remove(StorageKey::Orders.as_str(), &key.storage_id())
			.await?;
		if let Err(e) = self
			.storage
			.remove(
				StorageKey::OrderByCustomer.as_str(),
				&Self::index_id(&order.customer_id, &key),
			)
			.await
		{
			// A leftover entry is pruned on the next customer read
			tracing::warn!(order = %key, error = %e, "Failed to remove customer index entry");
		}
		Ok(())
	}

	/// One page of a store's orders. The cursor is the last order id seen.
	pub async fn page_for_store(
		&self,
		store_id: &str,
		cursor: Option<&str>,
		limit: usize,
	) -> Result<Page<Order>, DispatchError> {
		let prefix = format!("{}:", store_id);
		let start_after = cursor.map(|c| format!("{}{}", prefix, c));
		let page = self
			.storage
			.scan::<Order>(
				StorageKey::Orders.as_str(),
				&prefix,
				start_after.as_deref(),
				limit,
			)
			.await?;

		Ok(Page {
			items: page.items,
			next_cursor: page
				.next_cursor
				.map(|c| c.strip_prefix(&prefix).unwrap_or(&c).to_string()),
		})
	}

	/// Every live order of a store.
	pub async fn all_for_store(&self, store_id: &str) -> Result<Vec<Order>, DispatchError> {
		let entries = scan_all::<Order>(
			&self.storage,
			StorageKey::Orders.as_str(),
			&format!("{}:", store_id),
		)
		.await?;
		Ok(entries.into_iter().map(|(_, order)| order).collect())
	}

	/// One page over all live orders, in key order.
	pub async fn page(
		&self,
		cursor: Option<&str>,
		limit: usize,
	) -> Result<Page<Order>, DispatchError> {
		Ok(self
			.storage
			.scan::<Order>(StorageKey::Orders.as_str(), "", cursor, limit)
			.await?)
	}

	/// Every live order matching `filter`.
	pub async fn scan_filtered<F>(&self, filter: F) -> Result<Vec<Order>, DispatchError>
	where
		F: Fn(&Order) -> bool,
	{
		let entries = scan_all::<Order>(&self.storage, StorageKey::Orders.as_str(), "").await?;
		Ok(entries
			.into_iter()
			.map(|(_, order)| order)
			.filter(|order| filter(order))
			.collect())
	}

	/// Orders referenced by the customer's index entries.
	///
	/// Entries whose order is gone are removed as they are found.
	pub async fn indexed_for_customer(
		&self,
		customer_id: &str,
	) -> Result<Vec<Order>, DispatchError> {
		let entries = scan_all::<OrderKey>(
			&self.storage,
			StorageKey::OrderByCustomer.as_str(),
			&format!("{}:", customer_id),
		)
		.await?;

		let mut orders = Vec::with_capacity(entries.len());
		for (entry_id, key) in entries {
			match self.get(&key).await? {
				Some(order) => orders.push(order),
				None => {
					tracing::debug!(entry = %entry_id, "Pruning stale customer index entry");
					self.storage
						.remove(StorageKey::OrderByCustomer.as_str(), &entry_id)
						.await?;
				},
			}
		}
		Ok(orders)
	}
}
