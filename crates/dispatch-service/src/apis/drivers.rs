//! Driver-facing endpoints: nearby orders, claims and completion.

use axum::{
	extract::{Path, Query, State},
	response::Json,
};
use dispatch_types::{
	APIError, AcceptRequest, AcceptResponse, DeliveriesResponse, FinishRequest, FinishResponse,
	NearbyOrdersResponse, NearbyQuery,
};

use crate::server::AppState;

/// Handles GET /api/drivers/nearby.
pub async fn handle_nearby(
	State(state): State<AppState>,
	Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyOrdersResponse>, APIError> {
	let response = state
		.engine
		.geomatch()
		.find_nearby(query.lat, query.lng, query.distance_km)
		.await?;
	Ok(Json(response))
}

/// Handles POST /api/drivers/accept.
///
/// Exactly one of several concurrent claims on the same order succeeds; the
/// rest receive 409 with the order's current status.
pub async fn handle_accept(
	State(state): State<AppState>,
	Json(request): Json<AcceptRequest>,
) -> Result<Json<AcceptResponse>, APIError> {
	match state
		.engine
		.delivery()
		.accept(&request.store_id, &request.order_id, &request.driver_id)
		.await
	{
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::info!("Claim rejected: {}", e);
			Err(APIError::from(e))
		},
	}
}

/// Handles POST /api/drivers/finish.
pub async fn handle_finish(
	State(state): State<AppState>,
	Json(request): Json<FinishRequest>,
) -> Result<Json<FinishResponse>, APIError> {
	match state.engine.delivery().finish(request).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Delivery completion failed: {}", e);
			Err(APIError::from(e))
		},
	}
}

/// Handles GET /api/drivers/{driver_id}/deliveries.
pub async fn handle_deliveries(
	State(state): State<AppState>,
	Path(driver_id): Path<String>,
) -> Result<Json<DeliveriesResponse>, APIError> {
	let response = state.engine.queries().active_deliveries(&driver_id).await?;
	Ok(Json(response))
}
