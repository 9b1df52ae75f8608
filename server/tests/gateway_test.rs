//! Integration tests for the gateway's HTTP surface: health, auth, and the
//! snapshot bootstrap fallback. Exercises the router directly via `tower`'s
//! `oneshot`, without binding a real socket.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use notebook_server::{AppState, Config};
use tempfile::TempDir;
use tower::ServiceExt;

const TEST_TOKEN: &str = "test-shared-secret";

async fn test_app() -> (axum::Router, TempDir) {
	let temp_dir = TempDir::new().expect("create temp dir");
	let config = Config {
		listen_addr: "127.0.0.1:0".into(),
		data_dir: temp_dir.path().to_string_lossy().into_owned().into(),
		auth_token: Some(TEST_TOKEN.into()),
		persist_coalesce_ms: 50,
	};
	let state = AppState::new(config).await.expect("builds app state");
	(notebook_server::routes::init(state), temp_dir)
}

async fn test_app_without_token() -> (axum::Router, TempDir) {
	let temp_dir = TempDir::new().expect("create temp dir");
	let config = Config {
		listen_addr: "127.0.0.1:0".into(),
		data_dir: temp_dir.path().to_string_lossy().into_owned().into(),
		auth_token: None,
		persist_coalesce_ms: 50,
	};
	let state = AppState::new(config).await.expect("builds app state");
	(notebook_server::routes::init(state), temp_dir)
}

#[tokio::test]
async fn health_check_requires_no_auth() {
	let (app, _temp) = test_app().await;
	let response = app
		.oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = to_bytes(response.into_body(), 1024).await.unwrap();
	assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn snapshot_without_token_succeeds_when_auth_is_disabled() {
	let (app, _temp) = test_app_without_token().await;
	let response = app
		.oneshot(Request::builder().uri("/nb-1/snapshot").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn snapshot_without_token_is_unauthorized() {
	let (app, _temp) = test_app().await;
	let response = app
		.oneshot(Request::builder().uri("/nb-1/snapshot").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn snapshot_with_wrong_token_is_unauthorized() {
	let (app, _temp) = test_app().await;
	let response = app
		.oneshot(Request::builder().uri("/nb-1/snapshot?token=nope").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn snapshot_with_valid_token_returns_seeded_document() {
	let (app, _temp) = test_app().await;
	let uri = format!("/nb-1/snapshot?token={TEST_TOKEN}");
	let response = app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);

	let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
	let doc = notebook_crdt::NotebookDoc::from_update(&body).expect("decodes as a valid update");
	assert_eq!(doc.cell_count(), 2);
}

#[tokio::test]
async fn unknown_route_falls_back_to_self_description() {
	let (app, _temp) = test_app().await;
	let response = app.oneshot(Request::builder().uri("/anything/else").body(Body::empty()).unwrap()).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
	let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(json["ok"], true);
	assert_eq!(json["endpoints"]["websocket"], "/ws/:notebookId");
}

// vim: ts=4
