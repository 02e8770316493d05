//! Storage-related types for the dispatch engine.

use std::str::FromStr;

/// Storage namespaces for the collections the engine persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Live orders keyed by `store_id:order_id`.
	Orders,
	/// Secondary index entries keyed by `customer_id:store_id:order_id`.
	OrderByCustomer,
	/// Customer order history snapshots keyed by `customer_id:store_id:order_id`.
	History,
	/// Live push channels keyed by connection id.
	Connections,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrderByCustomer => "order_by_customer",
			StorageKey::History => "history",
			StorageKey::Connections => "connections",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::OrderByCustomer,
			Self::History,
			Self::Connections,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"order_by_customer" => Ok(Self::OrderByCustomer),
			"history" => Ok(Self::History),
			"connections" => Ok(Self::Connections),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
