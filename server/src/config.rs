//! Server configuration, read from environment variables.
//!
//! Replaces the teacher's settings-registry subsystem (per-tenant, database
//! backed, admin-editable) with a single flat struct read once at startup —
//! this gateway has no multi-tenant settings surface to register.

use notebook_types::prelude::*;

/// Environment variable carrying the shared bearer token clients must
/// present as the `token` query parameter (spec §7 auth).
const ENV_AUTH_TOKEN: &str = "COLLAB_AUTH_TOKEN";
const ENV_LISTEN_ADDR: &str = "COLLAB_LISTEN_ADDR";
const ENV_DATA_DIR: &str = "COLLAB_DATA_DIR";
const ENV_PERSIST_COALESCE_MS: &str = "COLLAB_PERSIST_COALESCE_MS";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_DATA_DIR: &str = "./data";
/// Spec §4.2: persistence writes are coalesced to at most once per second.
const DEFAULT_PERSIST_COALESCE_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct Config {
	pub listen_addr: Box<str>,
	pub data_dir: Box<str>,
	/// `None` when [`ENV_AUTH_TOKEN`] is unset or empty: the gateway is open
	/// and `/ws/:notebookId`/`/:notebookId/snapshot` accept requests without
	/// a `token` (spec §4.3 "When no secret is configured, the endpoint is
	/// open").
	pub auth_token: Option<Box<str>>,
	pub persist_coalesce_ms: u64,
}

impl Config {
	/// Load configuration from the environment. An unset or empty
	/// [`ENV_AUTH_TOKEN`] disables authentication rather than failing;
	/// requiring a token is an operator choice, not a hard requirement.
	pub fn from_env() -> Result<Self> {
		let auth_token = std::env::var(ENV_AUTH_TOKEN).ok().filter(|token| !token.is_empty());

		let listen_addr = std::env::var(ENV_LISTEN_ADDR).unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
		let data_dir = std::env::var(ENV_DATA_DIR).unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
		let persist_coalesce_ms = std::env::var(ENV_PERSIST_COALESCE_MS)
			.ok()
			.and_then(|v| v.parse().ok())
			.unwrap_or(DEFAULT_PERSIST_COALESCE_MS);

		Ok(Config {
			listen_addr: listen_addr.into(),
			data_dir: data_dir.into(),
			auth_token: auth_token.map(Into::into),
			persist_coalesce_ms,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_token_env_var_disables_auth() {
		let auth_token = Some(String::new()).filter(|token| !token.is_empty());
		assert_eq!(auth_token, None);
	}

	#[test]
	fn non_empty_token_env_var_is_kept() {
		let auth_token = Some("secret".to_string()).filter(|token| !token.is_empty());
		assert_eq!(auth_token.as_deref(), Some("secret"));
	}
}

// vim: ts=4
