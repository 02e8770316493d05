//! Customer-facing lookups.

use axum::{
	extract::{Path, State},
	response::Json,
};
use dispatch_types::{APIError, ActiveOrdersResponse, HistoryResponse};

use crate::server::AppState;

/// Handles GET /api/customers/{customer_id}/orders/active.
pub async fn handle_active_orders(
	State(state): State<AppState>,
	Path(customer_id): Path<String>,
) -> Result<Json<ActiveOrdersResponse>, APIError> {
	let response = state.engine.queries().active_orders(&customer_id).await?;
	Ok(Json(response))
}

/// Handles GET /api/customers/{customer_id}/orders/history.
pub async fn handle_order_history(
	State(state): State<AppState>,
	Path(customer_id): Path<String>,
) -> Result<Json<HistoryResponse>, APIError> {
	let response = state.engine.queries().order_history(&customer_id).await?;
	Ok(Json(response))
}
