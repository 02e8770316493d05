//! Persistent state owned by the engine.
//!
//! The order store carries the lifecycle state machine and its conditional
//! claim. The history store keeps the customer-facing snapshots that outlive
//! live orders, and the connection registry maps push channels to stores.

pub mod connection;
pub mod history;
pub mod order;

pub use connection::{ConnectionRegistry, StorageConnectionRegistry};
pub use history::HistoryStore;
pub use order::OrderStore;

use dispatch_storage::{StorageError, StorageService};
use serde::de::DeserializeOwned;

/// Page size used when a caller needs every entry under a prefix.
const SCAN_ALL_PAGE: usize = 200;

/// Reads every entry under `id_prefix`, following cursors to the end.
pub(crate) async fn scan_all<T: DeserializeOwned>(
	storage: &StorageService,
	namespace: &str,
	id_prefix: &str,
) -> Result<Vec<(String, T)>, StorageError> {
	let mut items = Vec::new();
	let mut cursor: Option<String> = None;
	loop {
		let page = storage
			.scan::<T>(namespace, id_prefix, cursor.as_deref(), SCAN_ALL_PAGE)
			.await?;
		items.extend(page.items);
		match page.next_cursor {
			Some(next) => cursor = Some(next),
			None => break,
		}
	}
	Ok(items)
}
