//! Gateway routes (C3): health, websocket upgrade, snapshot bootstrap
//! fallback, and a JSON self-description for anything else.
//!
//! Grounded on the teacher's `routes::init` composition shape (a `Router<App>`
//! built up from smaller route groups, CORS applied once via a layer) but
//! with the multi-tenant API surface (actions/profiles/files/auth/admin/...)
//! replaced entirely — this gateway fronts exactly one resource kind, a
//! notebook, addressed by `:notebookId`.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use notebook_crdt::protocol::decode_frame;
use notebook_types::prelude::*;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::extract::RequireToken;
use crate::AppState;

pub fn init(state: AppState) -> Router {
	// CORS applies to the HTTP surface only: websocket upgrade responses must
	// not carry CORS headers grafted on (spec §4.3).
	let http_routes = Router::new()
		.route("/api/health", get(health))
		.route("/{notebook_id}/snapshot", get(get_snapshot))
		.fallback(fallback)
		.layer(CorsLayer::very_permissive());

	Router::new()
		.merge(http_routes)
		.route("/ws/{notebook_id}", get(ws_upgrade))
		.with_state(state)
}

async fn health() -> impl IntoResponse {
	"ok"
}

async fn fallback() -> impl IntoResponse {
	Json(serde_json::json!({
		"ok": true,
		"message": "notebook-sync-gateway: unmatched path",
		"endpoints": {
			"health": "/api/health",
			"websocket": "/ws/:notebookId",
		},
	}))
}

/// HTTP fallback bootstrap path (spec §4.4 step 2): a client with no local
/// and no external snapshot can fetch the coordinator's current state
/// directly instead of waiting on a `SyncStep1`/`SyncStep2` round trip.
async fn get_snapshot(
	State(state): State<AppState>,
	Path(notebook_id): Path<String>,
	_token: RequireToken,
) -> Result<impl IntoResponse> {
	let notebook_id = NotebookId::new(notebook_id);
	let coordinator = state.registry.get_or_create(&notebook_id).await?;
	let snapshot = coordinator.snapshot();
	Ok(([(axum::http::header::CONTENT_TYPE, "application/octet-stream")], snapshot))
}

async fn ws_upgrade(
	State(state): State<AppState>,
	Path(notebook_id): Path<String>,
	_token: RequireToken,
	ws: WebSocketUpgrade,
) -> Result<impl IntoResponse> {
	let notebook_id = NotebookId::new(notebook_id);
	let coordinator = state.registry.get_or_create(&notebook_id).await?;
	Ok(ws.on_upgrade(move |socket| handle_socket(socket, coordinator)))
}

/// Run one connection end-to-end: send the initial `SyncStep1`, then pump
/// inbound frames into the coordinator and outbound frames from the
/// coordinator's broadcast queue back onto the wire, until either side
/// closes. Grounded on the teacher's `handle_crdt_connection` task-pair
/// shape (`crdt/websocket.rs`), generalized from one global doc/registry
/// pair to per-coordinator state.
async fn handle_socket(socket: WebSocket, coordinator: std::sync::Arc<crate::coordinator::NotebookCoordinator>) {
	let (mut sender, mut receiver) = socket.split();
	let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

	let (socket_id, step1, awareness_frames) = coordinator.register_socket(tx).await;
	if sender.send(Message::Binary(step1.into())).await.is_err() {
		coordinator.unregister_socket(socket_id, None).await;
		return;
	}
	for frame in awareness_frames {
		if sender.send(Message::Binary(frame.into())).await.is_err() {
			coordinator.unregister_socket(socket_id, None).await;
			return;
		}
	}

	let mut known_client_id: Option<String> = None;

	loop {
		tokio::select! {
			outbound = rx.recv() => {
				match outbound {
					Some(bytes) => {
						if sender.send(Message::Binary(bytes.into())).await.is_err() {
							break;
						}
					}
					None => break,
				}
			}
			inbound = receiver.next() => {
				match inbound {
					Some(Ok(Message::Binary(bytes))) => {
						match decode_frame(&bytes) {
							Ok(frame) => {
								known_client_id = coordinator.handle_frame(socket_id, frame, known_client_id).await;
							}
							Err(err) => {
								warn!(%socket_id, %err, "dropping malformed frame");
							}
						}
					}
					Some(Ok(Message::Close(_))) | None => break,
					Some(Ok(_)) => {}
					Some(Err(err)) => {
						warn!(%socket_id, %err, "websocket receive error, closing connection");
						break;
					}
				}
			}
		}
	}

	coordinator.unregister_socket(socket_id, known_client_id.as_deref()).await;
}

// vim: ts=4
