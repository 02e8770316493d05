//! Order types for the dispatch engine.
//!
//! An order is a customer's cart bound to one fulfilling store. It is
//! identified by the composite key (store_id, order_id) and moves through a
//! small fixed lifecycle: `pending` -> `ready` | `rejected`, `ready` ->
//! `in_delivery`, after which it is removed from the live collection.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status of a live order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Submitted by the customer, waiting for the store.
	Pending,
	/// Packed by the store and visible to nearby drivers.
	Ready,
	/// Declined by the store. Never persisted; the record is deleted instead.
	Rejected,
	/// Claimed by a driver.
	#[serde(alias = "in delivery")]
	InDelivery,
}

impl OrderStatus {
	/// Returns the wire name of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Ready => "ready",
			OrderStatus::Rejected => "rejected",
			OrderStatus::InDelivery => "in_delivery",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a status name is not recognised.
#[derive(Debug, Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"pending" => Ok(Self::Pending),
			"ready" => Ok(Self::Ready),
			"rejected" => Ok(Self::Rejected),
			"in_delivery" | "in delivery" => Ok(Self::InDelivery),
			other => Err(UnknownStatus(other.to_string())),
		}
	}
}

/// Composite identity of an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderKey {
	pub store_id: String,
	pub order_id: String,
}

impl OrderKey {
	pub fn new(store_id: impl Into<String>, order_id: impl Into<String>) -> Self {
		Self {
			store_id: store_id.into(),
			order_id: order_id.into(),
		}
	}

	/// Returns the id used inside the `orders` storage namespace.
	pub fn storage_id(&self) -> String {
		format!("{}:{}", self.store_id, self.order_id)
	}
}

impl fmt::Display for OrderKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.store_id, self.order_id)
	}
}

/// One cart line, carried on the wire as `"name:quantity"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LineItem {
	pub name: String,
	pub quantity: u32,
}

/// Error returned when a line entry is not in `name:quantity` form.
#[derive(Debug, Error)]
#[error("Invalid line item '{0}': expected name:quantity")]
pub struct InvalidLineItem(pub String);

impl FromStr for LineItem {
	type Err = InvalidLineItem;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		// Product names may themselves contain ':'; the quantity is after the last one
		let (name, quantity) = s
			.rsplit_once(':')
			.ok_or_else(|| InvalidLineItem(s.to_string()))?;
		let name = name.trim();
		let quantity: u32 = quantity
			.trim()
			.parse()
			.map_err(|_| InvalidLineItem(s.to_string()))?;
		if name.is_empty() || quantity == 0 {
			return Err(InvalidLineItem(s.to_string()));
		}
		Ok(Self {
			name: name.to_string(),
			quantity,
		})
	}
}

impl TryFrom<String> for LineItem {
	type Error = InvalidLineItem;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<LineItem> for String {
	fn from(item: LineItem) -> Self {
		item.to_string()
	}
}

impl fmt::Display for LineItem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.name, self.quantity)
	}
}

/// A live order record.
///
/// `driver_id` and `delivery_started_at` are set exactly when the status is
/// `in_delivery`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	pub store_id: String,
	pub order_id: String,
	pub customer_id: String,
	pub customer_name: String,
	pub customer_email: String,
	/// Free-text delivery address.
	pub customer_location: String,
	pub total_price: Decimal,
	pub items: Vec<LineItem>,
	pub status: OrderStatus,
	#[serde(default)]
	pub driver_id: Option<String>,
	#[serde(default)]
	pub delivery_started_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

impl Order {
	pub fn key(&self) -> OrderKey {
		OrderKey::new(self.store_id.clone(), self.order_id.clone())
	}

	/// Returns true if the order is in delivery with the given driver.
	pub fn is_claimed_by(&self, driver_id: &str) -> bool {
		self.status == OrderStatus::InDelivery && self.driver_id.as_deref() == Some(driver_id)
	}

	/// The minimal record kept in the customer's history.
	pub fn history_entry(&self) -> HistoryEntry {
		HistoryEntry {
			customer_id: self.customer_id.clone(),
			order_id: self.order_id.clone(),
			items: self.items.clone(),
		}
	}
}

/// An order as submitted by the ordering path, before it is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
	pub store_id: String,
	/// Assigned by the engine when absent.
	#[serde(default)]
	pub order_id: Option<String>,
	pub customer_id: String,
	#[serde(default)]
	pub customer_name: String,
	#[serde(default)]
	pub customer_email: String,
	#[serde(default)]
	pub customer_location: String,
	pub total_price: Decimal,
	pub items: Vec<LineItem>,
}

/// Snapshot of an order kept for "previous orders" lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
	pub customer_id: String,
	pub order_id: String,
	pub items: Vec<LineItem>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_aliases() {
		assert_eq!("in delivery".parse::<OrderStatus>().unwrap(), OrderStatus::InDelivery);
		assert_eq!("READY".parse::<OrderStatus>().unwrap(), OrderStatus::Ready);
		assert!("shipped".parse::<OrderStatus>().is_err());

		let status: OrderStatus = serde_json::from_str("\"in delivery\"").unwrap();
		assert_eq!(status, OrderStatus::InDelivery);
		assert_eq!(
			serde_json::to_string(&OrderStatus::InDelivery).unwrap(),
			"\"in_delivery\""
		);
	}

	#[test]
	fn test_line_item_parsing() {
		let item: LineItem = "milk 3%:2".parse().unwrap();
		assert_eq!(item.name, "milk 3%");
		assert_eq!(item.quantity, 2);

		let item: LineItem = "bread: rye:1".parse().unwrap();
		assert_eq!(item.name, "bread: rye");

		assert!("eggs".parse::<LineItem>().is_err());
		assert!("eggs:0".parse::<LineItem>().is_err());
		assert!(":4".parse::<LineItem>().is_err());
	}

	#[test]
	fn test_line_items_on_the_wire() {
		let items: Vec<LineItem> = serde_json::from_str(r#"["apples:6","tahini:1"]"#).unwrap();
		assert_eq!(items.len(), 2);
		assert_eq!(
			serde_json::to_string(&items).unwrap(),
			r#"["apples:6","tahini:1"]"#
		);
		assert!(serde_json::from_str::<Vec<LineItem>>(r#"["apples"]"#).is_err());
	}

	#[test]
	fn test_order_key_storage_id() {
		let key = OrderKey::new("store-1", "order-9");
		assert_eq!(key.storage_id(), "store-1:order-9");
		assert_eq!(key.to_string(), "store-1/order-9");
	}
}
