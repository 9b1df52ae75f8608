//! Error handling subsystem.
//!
//! Mirrors the taxonomy of spec §7: `ConfigError`, `TransportError`,
//! `ProtocolError`, `MisconfigurationError`, `InvariantViolation` (logged, not
//! surfaced), `KernelError`. One flat enum, manual `Display`, no `anyhow`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Requested notebook/coordinator doesn't exist (never happens in this
	/// design — coordinators are created lazily — kept for completeness).
	NotFound,
	/// `token` query parameter missing or mismatched against `COLLAB_AUTH_TOKEN`.
	Unauthorized,
	/// Malformed websocket frame; caller should drop the frame, not the socket.
	MalformedFrame,
	/// Persisted/encoded CRDT state exceeds the configured size threshold.
	SnapshotTooLarge { size: usize, limit: usize },
	/// Snapshot store is unreachable or returned an error.
	Storage(String),
	/// Missing/invalid configuration (e.g. no `collabServerUrl` while enabled).
	Config(String),
	/// Websocket close, HTTP non-2xx, timeout talking to a peer service.
	Transport(String),
	/// The kernel URL answered with the gateway's own self-description JSON.
	Misconfigured(String),
	/// Execution failed or returned malformed output.
	Kernel(String),
	/// A document mutation that would violate an invariant (e.g. deleting the
	/// last remaining cell).
	InvalidMutation(String),
	Io(std::io::Error),
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::Unauthorized => write!(f, "unauthorized"),
			Error::MalformedFrame => write!(f, "malformed frame"),
			Error::SnapshotTooLarge { size, limit } => {
				write!(f, "snapshot too large: {size} bytes (limit {limit})")
			}
			Error::Storage(msg) => write!(f, "storage error: {msg}"),
			Error::Config(msg) => write!(f, "config error: {msg}"),
			Error::Transport(msg) => write!(f, "transport error: {msg}"),
			Error::Misconfigured(msg) => write!(f, "misconfiguration: {msg}"),
			Error::Kernel(msg) => write!(f, "kernel error: {msg}"),
			Error::InvalidMutation(msg) => write!(f, "invalid mutation: {msg}"),
			Error::Io(err) => write!(f, "io error: {err}"),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		tracing::warn!("io error: {}", err);
		Error::Io(err)
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
	pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
	pub code: String,
	pub message: String,
}

impl ErrorResponse {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		ErrorResponse { error: ErrorDetails { code: code.into(), message: message.into() } }
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, code, message) = match &self {
			Error::NotFound => (StatusCode::NOT_FOUND, "E-NB-NOTFOUND", "Notebook not found".to_string()),
			Error::Unauthorized => {
				(StatusCode::UNAUTHORIZED, "E-AUTH-UNAUTH", "Missing or invalid token".to_string())
			}
			Error::MalformedFrame => {
				(StatusCode::BAD_REQUEST, "E-PROTO-MALFORMED", "Malformed frame".to_string())
			}
			Error::SnapshotTooLarge { .. } => (
				StatusCode::INSUFFICIENT_STORAGE,
				"E-NB-TOOLARGE",
				"Snapshot exceeds size limit".to_string(),
			),
			Error::Storage(_) => {
				tracing::warn!("storage error: {}", self);
				(StatusCode::INTERNAL_SERVER_ERROR, "E-NB-STORAGE", "Internal server error".to_string())
			}
			Error::Config(msg) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-NB-CONFIG", format!("Configuration error: {msg}"))
			}
			Error::Transport(_) => {
				(StatusCode::BAD_GATEWAY, "E-NB-TRANSPORT", "Upstream transport error".to_string())
			}
			Error::Misconfigured(msg) => {
				(StatusCode::MISDIRECTED_REQUEST, "E-NB-MISCONFIG", msg.clone())
			}
			Error::Kernel(msg) => {
				(StatusCode::BAD_GATEWAY, "E-NB-KERNEL", format!("Kernel error: {msg}"))
			}
			Error::InvalidMutation(msg) => (StatusCode::BAD_REQUEST, "E-NB-INVALIDMUT", msg.clone()),
			Error::Io(_) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-NB-IO", "Internal server error".to_string())
			}
		};

		(status, Json(ErrorResponse::new(code, message))).into_response()
	}
}

// vim: ts=4
