//! HTTP and WebSocket server for the dispatch API.

use axum::{
	routing::{get, post},
	Router,
};
use dispatch_config::ApiConfig;
use dispatch_core::DispatchEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::CorsLayer, limit::RequestBodyLimitLayer, map_response_body::MapResponseBodyLayer,
	timeout::TimeoutLayer,
};

use crate::apis::{customers, drivers, orders, socket};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<DispatchEngine>,
}

/// Builds the `/api` router with CORS, request timeout and body limit.
pub fn router(api_config: &ApiConfig, engine: Arc<DispatchEngine>) -> Router {
	let api = Router::new()
		.route("/orders", post(orders::handle_create))
		.route("/orders/status", post(orders::handle_transition))
		.route("/stores/{store_id}/orders", get(orders::handle_store_orders))
		.route("/stores/{store_id}/ws", get(socket::handle_store_socket))
		.route("/drivers/nearby", get(drivers::handle_nearby))
		.route("/drivers/accept", post(drivers::handle_accept))
		.route("/drivers/finish", post(drivers::handle_finish))
		.route(
			"/drivers/{driver_id}/deliveries",
			get(drivers::handle_deliveries),
		)
		.route(
			"/customers/{customer_id}/orders/active",
			get(customers::handle_active_orders),
		)
		.route(
			"/customers/{customer_id}/orders/history",
			get(customers::handle_order_history),
		);

	Router::new()
		.nest("/api", api)
		.layer(
			ServiceBuilder::new()
				.layer(CorsLayer::permissive())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(MapResponseBodyLayer::new(axum::body::Body::new))
				.layer(RequestBodyLimitLayer::new(api_config.max_request_size)),
		)
		.with_state(AppState { engine })
}

/// Binds the configured address and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<DispatchEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;
	tracing::info!("Dispatch API server starting on {}", bind_address);

	axum::serve(listener, app).await?;
	Ok(())
}
