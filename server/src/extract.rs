//! Token authentication (spec §7).
//!
//! Replaces the teacher's `AuthCtx`-based `TnId`/`Auth` extractors (multi-tenant
//! session/JWT verification) with the single shared-secret check this gateway
//! needs: every request must carry `?token=<COLLAB_AUTH_TOKEN>`.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use notebook_types::prelude::*;
use serde::Deserialize;

use crate::AppState;

#[derive(Debug, Deserialize)]
struct TokenQuery {
	token: Option<String>,
}

/// Extractor that rejects the request unless `token` matches the
/// configured secret. Present on `Parts` extraction so it runs before the
/// websocket upgrade or any handler body executes.
pub struct RequireToken;

impl FromRequestParts<AppState> for RequireToken {
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
		// No secret configured: the endpoint is open (spec §4.3).
		let Some(expected) = &state.config.auth_token else {
			return Ok(RequireToken);
		};

		let Query(query) = Query::<TokenQuery>::from_request_parts(parts, state)
			.await
			.map_err(|_| Error::Unauthorized)?;

		match query.token {
			Some(token) if token.as_bytes() == expected.as_bytes() => Ok(RequireToken),
			_ => Err(Error::Unauthorized),
		}
	}
}

// vim: ts=4
