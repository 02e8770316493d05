//! Events exchanged with store-side push channels.
//!
//! Outbound events are pushed by the engine to every live channel of a
//! store; inbound requests are sent by a store client over its own channel
//! and answered on that channel only.

use crate::Order;
use serde::{Deserialize, Serialize};

/// Event pushed to a store's live channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PushEvent {
	/// A customer placed a new order with the store.
	NewOrder { order: Order },
	/// All live orders of the store.
	OrderList { orders: Vec<Order> },
	/// Number of live orders of the store.
	OrderCount { count: usize },
}

impl PushEvent {
	/// Returns the wire name of the event.
	pub fn action(&self) -> &'static str {
		match self {
			PushEvent::NewOrder { .. } => "newOrder",
			PushEvent::OrderList { .. } => "orderList",
			PushEvent::OrderCount { .. } => "orderCount",
		}
	}
}

/// Request sent by a store client over its push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum StoreRequest {
	OrderList,
	OrderCount,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_push_event_wire_format() {
		let json = serde_json::to_value(PushEvent::OrderCount { count: 3 }).unwrap();
		assert_eq!(json, serde_json::json!({"action": "orderCount", "count": 3}));

		let json = serde_json::to_value(PushEvent::OrderList { orders: vec![] }).unwrap();
		assert_eq!(json["action"], "orderList");
		assert!(json["orders"].as_array().unwrap().is_empty());
	}

	#[test]
	fn test_store_request_parsing() {
		let request: StoreRequest = serde_json::from_str(r#"{"action":"orderList"}"#).unwrap();
		assert_eq!(request, StoreRequest::OrderList);
		let request: StoreRequest =
			serde_json::from_str(r#"{"action":"orderCount","store_id":"ignored"}"#).unwrap();
		assert_eq!(request, StoreRequest::OrderCount);
		assert!(serde_json::from_str::<StoreRequest>(r#"{"action":"dropTables"}"#).is_err());
	}
}
