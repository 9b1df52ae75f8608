//! HTTP client for the external execution kernel (spec §4.4, §6).
//!
//! The kernel itself is out of scope; this is the interface C4 consumes:
//! `health`, `execute`, `variables`, `restart`, `interrupt`. Built on
//! `reqwest`, the ecosystem's default async HTTP client, the way the
//! teacher reaches for `reqwest` anywhere it talks to an external HTTP API.

use notebook_types::prelude::*;
use serde::Deserialize;

/// Shape of the gateway's own fallback self-description JSON
/// (`server::routes::fallback`): `{ok, message, endpoints:{health, websocket}}`.
/// If a configured kernel URL answers `/health` with an `endpoints.websocket`
/// field, the operator pointed the kernel URL at the collab gateway by
/// mistake (spec §4.4's misrouted-kernel diagnostic).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KernelEndpoints {
	#[serde(default)]
	pub health: Option<String>,
	#[serde(default)]
	pub websocket: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KernelHealth {
	pub ok: bool,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub message: Option<String>,
	#[serde(default)]
	pub features: Option<Vec<String>>,
	/// Only carries a `websocket` entry on the gateway's self-description
	/// payload, never on a real kernel's health response; used purely for
	/// misrouting detection.
	#[serde(default)]
	pub endpoints: Option<KernelEndpoints>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteResult {
	pub output: serde_json::Value,
	pub execution_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariableInfo {
	pub name: String,
	#[serde(rename = "type")]
	pub type_name: String,
	pub preview: String,
}

pub struct KernelClient {
	http: reqwest::Client,
	base_url: Box<str>,
}

impl KernelClient {
	pub fn new(base_url: impl Into<Box<str>>) -> Self {
		KernelClient { http: reqwest::Client::new(), base_url: base_url.into() }
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url.trim_end_matches('/'), path)
	}

	/// Checks reachability and detects the misrouted-kernel-URL case (spec
	/// §4.4: "a diagnostic mentioning 'collaboration Worker' / 'Python kernel
	/// server'").
	pub async fn health(&self) -> Result<KernelHealth> {
		let response = self
			.http
			.get(self.url("/health"))
			.send()
			.await
			.map_err(|e| Error::Transport(e.to_string()))?;

		let health: KernelHealth =
			response.json().await.map_err(|e| Error::Transport(e.to_string()))?;

		if health.endpoints.as_ref().is_some_and(|endpoints| endpoints.websocket.is_some()) {
			return Err(Error::Misconfigured(
				"backendKernelUrl points at the collaboration Worker, not a Python kernel server"
					.to_string(),
			));
		}

		Ok(health)
	}

	pub async fn execute(&self, cell_id: &str, code: &str) -> Result<ExecuteResult> {
		self
			.http
			.post(self.url("/execute"))
			.json(&serde_json::json!({ "cellId": cell_id, "code": code }))
			.send()
			.await
			.map_err(|e| Error::Kernel(e.to_string()))?
			.json()
			.await
			.map_err(|e| Error::Kernel(e.to_string()))
	}

	pub async fn variables(&self) -> Result<Vec<VariableInfo>> {
		self
			.http
			.get(self.url("/variables"))
			.send()
			.await
			.map_err(|e| Error::Kernel(e.to_string()))?
			.json()
			.await
			.map_err(|e| Error::Kernel(e.to_string()))
	}

	pub async fn restart(&self) -> Result<()> {
		self.http.post(self.url("/restart")).send().await.map_err(|e| Error::Kernel(e.to_string()))?;
		Ok(())
	}

	pub async fn interrupt(&self, cell_id: &str) -> Result<()> {
		self
			.http
			.post(self.url("/interrupt"))
			.json(&serde_json::json!({ "cellId": cell_id }))
			.send()
			.await
			.map_err(|e| Error::Kernel(e.to_string()))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn misrouted_health_payload_is_detected_by_shape() {
		let payload = serde_json::json!({
			"ok": true,
			"message": "notebook-sync-gateway: unmatched path",
			"endpoints": {"health": "/api/health", "websocket": "/ws/:notebookId"},
		});
		let health: KernelHealth = serde_json::from_value(payload).expect("deserializes");
		assert!(health.endpoints.unwrap().websocket.is_some());
	}

	#[test]
	fn genuine_kernel_health_has_no_websocket_endpoint() {
		let payload = serde_json::json!({ "ok": true, "name": "pyodide-kernel" });
		let health: KernelHealth = serde_json::from_value(payload).expect("deserializes");
		assert!(health.endpoints.is_none());
	}
}

// vim: ts=4
