//! Store push channel over WebSocket.
//!
//! GET /api/stores/{store_id}/ws
//!
//! - Server → store: `newOrder`, `orderList`, `orderCount` events as JSON
//!   text frames.
//! - Store → server: `{"action":"orderList"}` or `{"action":"orderCount"}`,
//!   answered on the same channel only.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use dispatch_core::{DispatchEngine, DispatchError};
use dispatch_types::{truncate_id, PushEvent, StoreRequest};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::server::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Handles GET /api/stores/{store_id}/ws.
pub async fn handle_store_socket(
	State(state): State<AppState>,
	Path(store_id): Path<String>,
	ws: WebSocketUpgrade,
) -> impl IntoResponse {
	ws.on_upgrade(move |socket| store_session(socket, state.engine, store_id))
}

/// Attaches an outbound queue and registers a fresh channel for the store.
pub(crate) async fn open_channel(
	engine: &DispatchEngine,
	store_id: &str,
) -> Result<(String, mpsc::UnboundedReceiver<PushEvent>), DispatchError> {
	let connection_id = Uuid::new_v4().to_string();
	let outbound = engine.hub().attach(&connection_id);
	if let Err(e) = engine.connections().register(&connection_id, store_id).await {
		engine.hub().detach(&connection_id);
		return Err(e);
	}
	Ok((connection_id, outbound))
}

/// Unregisters the channel and drops its outbound queue.
pub(crate) async fn close_channel(engine: &DispatchEngine, connection_id: &str) {
	if let Err(e) = engine.connections().unregister(connection_id).await {
		tracing::warn!(
			connection_id = %truncate_id(connection_id),
			error = %e,
			"Failed to unregister store channel"
		);
	}
	engine.hub().detach(connection_id);
}

/// Handles one text frame from the store. The answer travels back through
/// the channel's outbound queue.
pub(crate) async fn handle_text(engine: &DispatchEngine, connection_id: &str, text: &str) {
	let request = match serde_json::from_str::<StoreRequest>(text) {
		Ok(request) => request,
		Err(e) => {
			tracing::debug!(
				connection_id = %truncate_id(connection_id),
				error = %e,
				"Ignoring unrecognised store message"
			);
			return;
		},
	};
	if let Err(e) = engine
		.orders()
		.handle_store_request(connection_id, request)
		.await
	{
		tracing::warn!(
			connection_id = %truncate_id(connection_id),
			error = %e,
			"Store request failed"
		);
	}
}

async fn store_session(socket: WebSocket, engine: Arc<DispatchEngine>, store_id: String) {
	let (connection_id, mut outbound) = match open_channel(&engine, &store_id).await {
		Ok(channel) => channel,
		Err(e) => {
			tracing::warn!(store_id = %store_id, error = %e, "Rejected store channel");
			return;
		},
	};
	tracing::info!(
		store_id = %store_id,
		connection_id = %truncate_id(&connection_id),
		"Store channel connected"
	);

	let (mut sink, mut stream) = socket.split();
	let mut ping_interval = tokio::time::interval(PING_INTERVAL);
	ping_interval.tick().await;

	loop {
		tokio::select! {
			_ = ping_interval.tick() => {
				if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
					break;
				}
			}

			event = outbound.recv() => {
				let Some(event) = event else { break };
				let text = match serde_json::to_string(&event) {
					Ok(text) => text,
					Err(e) => {
						tracing::error!(action = event.action(), error = %e, "Failed to encode push event");
						continue;
					}
				};
				if sink.send(Message::Text(text.into())).await.is_err() {
					break;
				}
			}

			msg = stream.next() => {
				match msg {
					Some(Ok(Message::Text(text))) => {
						handle_text(&engine, &connection_id, text.as_str()).await;
					}
					Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
					Some(Ok(_)) => {}
				}
			}
		}
	}

	close_channel(&engine, &connection_id).await;
	tracing::info!(
		store_id = %store_id,
		connection_id = %truncate_id(&connection_id),
		"Store channel disconnected"
	);
}
