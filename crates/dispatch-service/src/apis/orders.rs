//! Order submission and store-side order management.

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::Json,
};
use dispatch_types::{
	APIError, NewOrder, Order, OrdersPageResponse, PageQuery, TransitionRequest,
	TransitionResponse,
};

use crate::server::AppState;

/// Handles POST /api/orders.
pub async fn handle_create(
	State(state): State<AppState>,
	Json(submission): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), APIError> {
	match state.engine.orders().create(submission).await {
		Ok(order) => Ok((StatusCode::CREATED, Json(order))),
		Err(e) => {
			tracing::warn!("Order submission failed: {}", e);
			Err(APIError::from(e))
		},
	}
}

/// Handles POST /api/orders/status.
pub async fn handle_transition(
	State(state): State<AppState>,
	Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, APIError> {
	state
		.engine
		.orders()
		.transition(
			&request.store_id,
			&request.order_id,
			request.status,
			request.driver_id.as_deref(),
		)
		.await
		.map(Json)
		.map_err(|e| {
			tracing::warn!("Status change failed: {}", e);
			APIError::from(e)
		})
}

/// Handles GET /api/stores/{store_id}/orders.
pub async fn handle_store_orders(
	State(state): State<AppState>,
	Path(store_id): Path<String>,
	Query(page): Query<PageQuery>,
) -> Result<Json<OrdersPageResponse>, APIError> {
	let response = state
		.engine
		.orders()
		.query_by_owner(&store_id, page.cursor.as_deref(), page.limit)
		.await?;
	Ok(Json(response))
}

#[cfg(test)]
mod tests {
	use crate::server::test_support::{call, engine, new_order};
	use axum::http::StatusCode;
	use serde_json::json;

	#[tokio::test]
	async fn test_create_then_list_for_store() {
		let engine = engine();
		let (status, order) =
			call(&engine, "POST", "/api/orders", Some(new_order("s1", "o1", "c1"))).await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(order["status"], "pending");
		assert_eq!(order["items"], json!(["Milk 3%:2", "Challah:1"]));

		let (status, page) = call(&engine, "GET", "/api/stores/s1/orders", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(page["count"], 1);
		assert_eq!(page["orders"][0]["order_id"], "o1");
	}

	#[tokio::test]
	async fn test_store_listing_pages_with_cursor() {
		let engine = engine();
		for id in ["o1", "o2", "o3"] {
			call(&engine, "POST", "/api/orders", Some(new_order("s1", id, "c1"))).await;
		}

		let (_, first) = call(&engine, "GET", "/api/stores/s1/orders?limit=2", None).await;
		assert_eq!(first["count"], 2);
		let cursor = first["next_cursor"].as_str().unwrap().to_string();

		let uri = format!("/api/stores/s1/orders?limit=2&cursor={}", cursor);
		let (_, second) = call(&engine, "GET", &uri, None).await;
		assert_eq!(second["count"], 1);
		assert!(second.get("next_cursor").is_none());
	}

	#[tokio::test]
	async fn test_transition_errors_map_to_status_codes() {
		let engine = engine();
		call(&engine, "POST", "/api/orders", Some(new_order("s1", "o1", "c1"))).await;

		let (status, body) = call(
			&engine,
			"POST",
			"/api/orders/status",
			Some(json!({"store_id": "s1", "order_id": "o1", "status": "in_delivery"})),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "INVALID_ARGUMENT");

		let (status, _) = call(
			&engine,
			"POST",
			"/api/orders/status",
			Some(json!({"store_id": "s1", "order_id": "missing", "status": "rejected"})),
		)
		.await;
		assert_eq!(status, StatusCode::NOT_FOUND);

		// Still pending, so a driver cannot claim it
		let (status, body) = call(
			&engine,
			"POST",
			"/api/orders/status",
			Some(json!({
				"store_id": "s1",
				"order_id": "o1",
				"status": "in_delivery",
				"driver_id": "d1"
			})),
		)
		.await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["details"]["current_status"], "pending");
	}

	#[tokio::test]
	async fn test_reject_removes_order() {
		let engine = engine();
		call(&engine, "POST", "/api/orders", Some(new_order("s1", "o1", "c1"))).await;

		let (status, body) = call(
			&engine,
			"POST",
			"/api/orders/status",
			Some(json!({"store_id": "s1", "order_id": "o1", "status": "rejected"})),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["removed"], true);

		let (_, page) = call(&engine, "GET", "/api/stores/s1/orders", None).await;
		assert_eq!(page["count"], 0);
	}
}
