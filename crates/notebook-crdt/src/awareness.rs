//! Ephemeral presence tracking (spec §4.3 Awareness).
//!
//! Awareness state is never persisted and never merged through the CRDT —
//! it's a plain last-write-wins map keyed by client id, aged out after a
//! staleness threshold. Grounded on the shape of `AwarenessState` in
//! `server/src/crdt/websocket.rs`, generalized to a registry so the
//! coordinator can compute "added / updated / removed" deltas per update
//! instead of only ever broadcasting blind.

use std::collections::HashMap;

use notebook_types::prelude::*;
use serde::{Deserialize, Serialize};

/// How long a client's awareness entry survives without a heartbeat before
/// it's considered stale and evicted (spec §4.3).
pub const STALE_AFTER_SECS: i64 = 60;

/// Client-side heartbeat cadence (spec §6 ClientSession).
pub const HEARTBEAT_INTERVAL_SECS: i64 = 15;

/// One client's ephemeral presence. `state` is an opaque JSON blob the
/// client controls (cursor position, selected cell, display name, color);
/// the registry only cares about `client_id` and `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AwarenessState {
	pub client_id: String,
	pub state: serde_json::Value,
	#[serde(default = "Timestamp::now")]
	pub timestamp: Timestamp,
}

/// Result of folding one incoming [`AwarenessState`] into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwarenessDelta {
	Added,
	Updated,
	/// `state` was `null`, an explicit "I'm leaving" signal.
	Removed,
}

#[derive(Default)]
pub struct AwarenessRegistry {
	clients: HashMap<String, AwarenessState>,
}

impl AwarenessRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.clients.is_empty()
	}

	pub fn len(&self) -> usize {
		self.clients.len()
	}

	/// Apply an incoming state, returning what changed so the caller can log
	/// or react to it. A `null` state removes the client explicitly.
	pub fn apply(&mut self, mut incoming: AwarenessState) -> AwarenessDelta {
		if incoming.state.is_null() {
			self.clients.remove(&incoming.client_id);
			return AwarenessDelta::Removed;
		}
		incoming.timestamp = Timestamp::now();
		match self.clients.insert(incoming.client_id.clone(), incoming) {
			Some(_) => AwarenessDelta::Updated,
			None => AwarenessDelta::Added,
		}
	}

	/// Drop this client's entry (e.g. on socket close), returning whether it
	/// was present.
	pub fn remove(&mut self, client_id: &str) -> bool {
		self.clients.remove(client_id).is_some()
	}

	/// Evict entries whose last heartbeat is older than [`STALE_AFTER_SECS`].
	/// Returns the evicted client ids.
	pub fn evict_stale(&mut self, now: Timestamp) -> Vec<String> {
		let stale: Vec<String> = self
			.clients
			.iter()
			.filter(|(_, state)| state.timestamp.elapsed_secs(now) > STALE_AFTER_SECS)
			.map(|(id, _)| id.clone())
			.collect();
		for id in &stale {
			self.clients.remove(id);
		}
		stale
	}

	pub fn states(&self) -> impl Iterator<Item = &AwarenessState> {
		self.clients.values()
	}

	/// Leader election: the client with the lexicographically smallest id
	/// wins (spec Open Question resolution: ties are impossible because
	/// every session mints a globally-unique nonce-suffixed id up front, so
	/// plain ordering is a total order in practice).
	pub fn leader(&self) -> Option<&str> {
		self.clients.keys().min().map(String::as_str)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn state(client_id: &str) -> AwarenessState {
		AwarenessState {
			client_id: client_id.to_string(),
			state: serde_json::json!({"name": "ada"}),
			timestamp: Timestamp::now(),
		}
	}

	#[test]
	fn apply_reports_added_then_updated() {
		let mut registry = AwarenessRegistry::new();
		assert_eq!(registry.apply(state("a")), AwarenessDelta::Added);
		assert_eq!(registry.apply(state("a")), AwarenessDelta::Updated);
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn null_state_removes() {
		let mut registry = AwarenessRegistry::new();
		registry.apply(state("a"));
		let leaving = AwarenessState { client_id: "a".into(), state: serde_json::Value::Null, timestamp: Timestamp::now() };
		assert_eq!(registry.apply(leaving), AwarenessDelta::Removed);
		assert!(registry.is_empty());
	}

	#[test]
	fn evict_stale_removes_only_old_entries() {
		let mut registry = AwarenessRegistry::new();
		let old = AwarenessState { client_id: "a".into(), state: serde_json::json!({}), timestamp: Timestamp(0) };
		registry.clients.insert("a".to_string(), old);
		registry.apply(state("b"));

		let now = Timestamp(STALE_AFTER_SECS + 10);
		let evicted = registry.evict_stale(now);
		assert_eq!(evicted, vec!["a".to_string()]);
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn leader_is_lowest_client_id() {
		let mut registry = AwarenessRegistry::new();
		registry.apply(state("zeta"));
		registry.apply(state("alpha"));
		registry.apply(state("mid"));
		assert_eq!(registry.leader(), Some("alpha"));
	}
}

// vim: ts=4
