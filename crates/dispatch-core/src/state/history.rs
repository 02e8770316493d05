//! Customer order history.
//!
//! Snapshots are keyed by `customer_id:store_id:order_id`, so archiving the
//! same order again overwrites its entry instead of adding a second one,
//! while equal order ids from different stores stay apart.

use crate::error::DispatchError;
use crate::state::scan_all;
use dispatch_storage::StorageService;
use dispatch_types::{HistoryEntry, Order, StorageKey};
use std::sync::Arc;

pub struct HistoryStore {
	storage: Arc<StorageService>,
}

impl HistoryStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Records the order's current items in the customer's history.
	pub async fn archive(&self, order: &Order) -> Result<HistoryEntry, DispatchError> {
		let entry = order.history_entry();
		self.storage
			.store(
				StorageKey::History.as_str(),
				&format!("{}:{}:{}", order.customer_id, order.store_id, order.order_id),
				&entry,
			)
			.await?;
		Ok(entry)
	}

	/// All snapshots for a customer, ordered by store then order id.
	pub async fn list(&self, customer_id: &str) -> Result<Vec<HistoryEntry>, DispatchError> {
		let entries = scan_all::<HistoryEntry>(
			&self.storage,
			StorageKey::History.as_str(),
			&format!("{}:", customer_id),
		)
		.await?;
		Ok(entries.into_iter().map(|(_, entry)| entry).collect())
	}
}
