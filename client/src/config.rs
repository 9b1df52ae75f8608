//! Client-side configuration (spec §8 config table).

/// Strict kernel backend selection; no automatic cross-fallback (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelMode {
	Backend,
	Pyodide,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Notebook being edited; also the routing key sent to the gateway.
	pub notebook_id: notebook_types::NotebookId,
	/// Base URL of the collaboration gateway (C3), e.g. `https://collab.example.com`.
	/// `None` means collaboration is disabled and the session runs local-only.
	pub collab_server_url: Option<Box<str>>,
	/// Shared token sent as the `token` query parameter on every gateway request.
	pub auth_token: Box<str>,
	/// Watchdog for bootstrap step 3 and `connecting -> fallback` (spec §4.4).
	pub collab_connect_timeout_ms: u64,
	/// Base URL of the execution kernel; `None` means no backend kernel is
	/// configured and the embedder must supply an in-browser fallback.
	pub backend_kernel_url: Option<Box<str>>,
	pub kernel_mode: KernelMode,
}

impl ClientConfig {
	pub fn collab_enabled(&self) -> bool {
		self.collab_server_url.as_deref().is_some_and(|s| !s.is_empty())
	}
}

// vim: ts=4
