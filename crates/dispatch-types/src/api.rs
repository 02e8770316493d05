//! API types for the dispatch HTTP surface.
//!
//! Request bodies use snake_case field names. Error bodies follow a common
//! `ErrorResponse` envelope produced by [`APIError`].

use crate::{Coordinates, HistoryEntry, LineItem, Order, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request to move an order through the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
	pub store_id: String,
	pub order_id: String,
	pub status: OrderStatus,
	/// Required when `status` is `in_delivery`.
	#[serde(default)]
	pub driver_id: Option<String>,
}

/// Response to a successful transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
	pub store_id: String,
	pub order_id: String,
	pub status: OrderStatus,
	/// Set when the record was deleted (`rejected`).
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub removed: bool,
}

/// Query string for paged store order listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
	pub cursor: Option<String>,
	pub limit: Option<usize>,
}

/// One page of a store's orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersPageResponse {
	pub store_id: String,
	pub count: usize,
	pub orders: Vec<Order>,
	/// Pass back as `cursor` to continue; absent on the last page.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub next_cursor: Option<String>,
}

/// Query string for the nearby-orders lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct NearbyQuery {
	pub lat: f64,
	pub lng: f64,
	#[serde(default, alias = "distanceKm")]
	pub distance_km: Option<f64>,
}

/// A ready order within a driver's search radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyOrder {
	pub store_id: String,
	pub order_id: String,
	pub customer_id: String,
	pub customer_name: String,
	pub customer_location: String,
	pub customer_email: String,
	pub total_price: Decimal,
	/// Rendered as `"lat,lng"`.
	pub store_coordinates: String,
	pub distance_km: f64,
}

impl NearbyOrder {
	pub fn new(order: &Order, store: &Coordinates, distance_km: f64) -> Self {
		Self {
			store_id: order.store_id.clone(),
			order_id: order.order_id.clone(),
			customer_id: order.customer_id.clone(),
			customer_name: order.customer_name.clone(),
			customer_location: order.customer_location.clone(),
			customer_email: order.customer_email.clone(),
			total_price: order.total_price,
			store_coordinates: store.to_string(),
			distance_km,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyOrdersResponse {
	pub count: usize,
	pub orders: Vec<NearbyOrder>,
}

/// A driver's claim on a ready order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptRequest {
	pub store_id: String,
	pub order_id: String,
	pub driver_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptResponse {
	pub message: String,
	pub order: Order,
}

/// Price as sent by driver apps: a JSON number or a string that may contain
/// `,` thousands separators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceInput {
	Number(f64),
	Text(String),
}

/// Request to complete a delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishRequest {
	pub store_id: String,
	pub order_id: String,
	pub driver_id: String,
	pub driver_email: String,
	pub price: PriceInput,
	/// Overrides the customer e-mail stored on the order.
	#[serde(default, alias = "customerMail")]
	pub customer_email: Option<String>,
	#[serde(default, alias = "customerName")]
	pub customer_name: Option<String>,
}

/// Payment created for a completed delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
	pub payment_id: String,
	pub approval_url: String,
	pub amount: Decimal,
	pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishResponse {
	pub message: String,
	pub store_id: String,
	pub order_id: String,
	pub payment: PaymentSummary,
	/// False when the customer e-mail was skipped or failed.
	pub email_sent: bool,
}

/// Customer-facing view of a live order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveOrderView {
	pub order_id: String,
	pub store_id: String,
	pub status: OrderStatus,
	pub total_price: Decimal,
	pub items: Vec<LineItem>,
}

impl From<&Order> for ActiveOrderView {
	fn from(order: &Order) -> Self {
		Self {
			order_id: order.order_id.clone(),
			store_id: order.store_id.clone(),
			status: order.status,
			total_price: order.total_price,
			items: order.items.clone(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveOrdersResponse {
	pub customer_id: String,
	pub count: usize,
	pub orders: Vec<ActiveOrderView>,
	/// Present as `"scan"` when the customer index was bypassed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fallback: Option<String>,
}

/// One entry of a customer's previous orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
	pub order_id: String,
	pub items: Vec<LineItem>,
}

impl From<HistoryEntry> for HistoryItem {
	fn from(entry: HistoryEntry) -> Self {
		Self {
			order_id: entry.order_id,
			items: entry.items,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
	pub customer_id: String,
	pub orders: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveriesResponse {
	pub driver_id: String,
	pub count: usize,
	pub orders: Vec<Order>,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request or missing field (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Referenced order or connection is absent (404)
	NotFound { error_type: String, message: String },
	/// Conditional transition failed; details carry the current status (409)
	Conflict {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// A collaborator call failed or timed out (502)
	BadGateway {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::BadGateway { .. } => 502,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details, retry_after) = match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			}
			| APIError::Conflict {
				error_type,
				message,
				details,
			} => (error_type, message, details.clone(), None),
			APIError::NotFound {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message, None, None),
			APIError::BadGateway {
				error_type,
				message,
				retry_after,
			} => (error_type, message, None, *retry_after),
		};
		ErrorResponse {
			error: error.clone(),
			message: message.clone(),
			details,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::BadGateway { message, .. } => write!(f, "Bad Gateway: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
