//! Runtime cell state (spec §3): execution status per cell, never CRDT-replicated.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellRunStatus {
	Idle,
	Running,
	Success,
	Error,
}

/// `CellOutput.type` (spec §6): the kernel picks the rendering kind, the
/// client never inspects `content` to guess it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellOutputKind {
	Text,
	Plot,
	Table,
	Latex,
	Error,
	Html,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CellOutput {
	#[serde(rename = "type")]
	pub kind: CellOutputKind,
	pub content: String,
}

impl CellOutput {
	pub fn error(message: impl Into<String>) -> Self {
		CellOutput { kind: CellOutputKind::Error, content: message.into() }
	}
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RuntimeCellState {
	#[serde(default)]
	pub status: Option<CellRunStatus>,
	#[serde(default)]
	pub output: Option<CellOutput>,
	#[serde(default)]
	pub execution_count: Option<u64>,
	#[serde(default)]
	pub is_collapsed: bool,
}

impl RuntimeCellState {
	pub fn idle() -> Self {
		RuntimeCellState { status: Some(CellRunStatus::Idle), ..Default::default() }
	}

	/// Entered right before dispatching to the kernel (spec §4.4 "Execution"):
	/// the previous output is cleared, not just left stale.
	pub fn running() -> Self {
		RuntimeCellState { status: Some(CellRunStatus::Running), ..Default::default() }
	}

	pub fn success(output: CellOutput, execution_count: u64) -> Self {
		RuntimeCellState {
			status: Some(CellRunStatus::Success),
			output: Some(output),
			execution_count: Some(execution_count),
			is_collapsed: false,
		}
	}

	pub fn failed(output: CellOutput) -> Self {
		RuntimeCellState { status: Some(CellRunStatus::Error), output: Some(output), ..Default::default() }
	}
}

/// Keyed by `Cell.id`; entries for cells no longer present in the document
/// are pruned by the session after each observed CRDT update (spec §3).
#[derive(Debug, Default)]
pub struct RuntimeState {
	cells: HashMap<String, RuntimeCellState>,
}

impl RuntimeState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, cell_id: &str) -> Option<&RuntimeCellState> {
		self.cells.get(cell_id)
	}

	pub fn set(&mut self, cell_id: impl Into<String>, state: RuntimeCellState) {
		self.cells.insert(cell_id.into(), state);
	}

	/// Drop entries for cells no longer present in `live_ids` (spec §3:
	/// "cleared when its cell disappears from the document").
	pub fn prune(&mut self, live_ids: &[String]) {
		let live: std::collections::HashSet<&str> = live_ids.iter().map(String::as_str).collect();
		self.cells.retain(|id, _| live.contains(id.as_str()));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prune_drops_entries_for_vanished_cells() {
		let mut state = RuntimeState::new();
		state.set("a", RuntimeCellState::idle());
		state.set("b", RuntimeCellState::idle());
		state.prune(&["a".to_string()]);
		assert!(state.get("a").is_some());
		assert!(state.get("b").is_none());
	}

	#[test]
	fn success_state_carries_output_and_execution_count() {
		let state = RuntimeCellState::success(CellOutput { kind: CellOutputKind::Text, content: "42".into() }, 3);
		assert_eq!(state.status, Some(CellRunStatus::Success));
		assert_eq!(state.execution_count, Some(3));
		assert_eq!(state.output.unwrap().content, "42");
	}

	#[test]
	fn failed_state_has_error_status_and_no_execution_count() {
		let state = RuntimeCellState::failed(CellOutput::error("boom"));
		assert_eq!(state.status, Some(CellRunStatus::Error));
		assert_eq!(state.execution_count, None);
		assert_eq!(state.output.unwrap().kind, CellOutputKind::Error);
	}
}

// vim: ts=4
