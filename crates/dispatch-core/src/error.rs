//! Error taxonomy shared by every engine operation.

use dispatch_storage::StorageError;
use dispatch_types::{APIError, OrderStatus};
use thiserror::Error;

/// Errors returned by engine operations.
///
/// `NotFound`, `Conflict` and `InvalidArgument` are actionable by the caller.
/// `UpstreamUnavailable` means a collaborator failed and the operation left
/// no partial state behind.
#[derive(Debug, Error)]
pub enum DispatchError {
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Order {order_id} is {}", render_status(.current_status))]
	Conflict {
		order_id: String,
		/// `None` when the record no longer exists.
		current_status: Option<OrderStatus>,
	},
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Upstream unavailable: {0}")]
	UpstreamUnavailable(String),
	#[error("Internal error: {0}")]
	Internal(String),
}

fn render_status(status: &Option<OrderStatus>) -> &'static str {
	status.map(|s| s.as_str()).unwrap_or("not_found")
}

impl DispatchError {
	/// Wire name of the status carried by a `Conflict`.
	pub fn conflict_status(&self) -> Option<&'static str> {
		match self {
			DispatchError::Conflict { current_status, .. } => Some(render_status(current_status)),
			_ => None,
		}
	}
}

impl From<StorageError> for DispatchError {
	fn from(err: StorageError) -> Self {
		DispatchError::Internal(err.to_string())
	}
}

/// Seconds a client should wait before retrying a failed collaborator call.
const UPSTREAM_RETRY_AFTER_SECS: u64 = 5;

impl From<DispatchError> for APIError {
	fn from(err: DispatchError) -> Self {
		let message = err.to_string();
		match err {
			DispatchError::NotFound(_) => APIError::NotFound {
				error_type: "NOT_FOUND".to_string(),
				message,
			},
			DispatchError::Conflict {
				ref current_status, ..
			} => APIError::Conflict {
				error_type: "ORDER_CONFLICT".to_string(),
				message,
				details: Some(serde_json::json!({
					"current_status": render_status(current_status),
				})),
			},
			DispatchError::InvalidArgument(_) => APIError::BadRequest {
				error_type: "INVALID_ARGUMENT".to_string(),
				message,
				details: None,
			},
			DispatchError::UpstreamUnavailable(_) => APIError::BadGateway {
				error_type: "UPSTREAM_UNAVAILABLE".to_string(),
				message,
				retry_after: Some(UPSTREAM_RETRY_AFTER_SECS),
			},
			DispatchError::Internal(_) => APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message,
			},
		}
	}
}

/// Rejects identifiers that would break the `namespace:id` key layout.
pub(crate) fn require_id(field: &str, value: &str) -> Result<(), DispatchError> {
	if value.trim().is_empty() {
		return Err(DispatchError::InvalidArgument(format!("{} is required", field)));
	}
	if value.contains(':') {
		return Err(DispatchError::InvalidArgument(format!(
			"{} must not contain ':'",
			field
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_conflict_renders_missing_record() {
		let err = DispatchError::Conflict {
			order_id: "o1".into(),
			current_status: None,
		};
		assert_eq!(err.to_string(), "Order o1 is not_found");
		assert_eq!(err.conflict_status(), Some("not_found"));

		let err = DispatchError::Conflict {
			order_id: "o1".into(),
			current_status: Some(OrderStatus::InDelivery),
		};
		assert_eq!(err.conflict_status(), Some("in_delivery"));
	}

	#[test]
	fn test_require_id() {
		assert!(require_id("store_id", "s1").is_ok());
		assert!(matches!(
			require_id("store_id", " "),
			Err(DispatchError::InvalidArgument(_))
		));
		assert!(matches!(
			require_id("order_id", "a:b"),
			Err(DispatchError::InvalidArgument(_))
		));
	}

	#[test]
	fn test_api_error_mapping() {
		let conflict = APIError::from(DispatchError::Conflict {
			order_id: "o1".into(),
			current_status: Some(OrderStatus::InDelivery),
		});
		assert_eq!(conflict.status_code(), 409);
		let body = conflict.to_error_response();
		assert_eq!(body.details.unwrap()["current_status"], "in_delivery");

		let upstream = APIError::from(DispatchError::UpstreamUnavailable("payment".into()));
		assert_eq!(upstream.status_code(), 502);
		assert_eq!(upstream.to_error_response().retry_after, Some(5));

		assert_eq!(APIError::from(DispatchError::NotFound("o1".into())).status_code(), 404);
		assert_eq!(
			APIError::from(DispatchError::InvalidArgument("x".into())).status_code(),
			400
		);
		assert_eq!(APIError::from(DispatchError::Internal("x".into())).status_code(), 500);
	}
}
