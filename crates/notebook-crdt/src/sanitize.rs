//! Invariant enforcement for a freshly hydrated document (spec §4.2 step 2).
//!
//! Runs once after a coordinator loads a snapshot (or a client bootstraps
//! one locally) and is idempotent: running it twice in a row is a no-op the
//! second time. It never rejects a document — a notebook synced from a
//! stale or half-written snapshot must still become usable.

use yrs::{Any, Array, GetString, Map, MapPrelim, MapRef, Text, TextPrelim, TextRef, Transact, Value};

use crate::doc::{
	CELL_CONTENT_KEY, CELL_ID_KEY, CELL_TYPE_KEY, CellType, NotebookDoc, mint_cell_id,
};

/// Origin tag used for the sanitize transaction, so a coordinator can
/// recognize and, if it chooses, suppress broadcasting a sanitize-only
/// fixup back out as if it were a genuine peer edit.
pub const SANITIZE_ORIGIN: u64 = 0;

/// What, if anything, sanitize had to fix. Useful for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SanitizeReport {
	pub assigned_ids: usize,
	pub deduplicated_ids: usize,
	pub coerced_types: usize,
	pub inserted_default_cell: bool,
}

impl SanitizeReport {
	pub fn is_clean(&self) -> bool {
		*self == SanitizeReport::default()
	}
}

/// Enforce: every cell has a non-empty, unique `id`; every `type` is a
/// recognized [`CellType`]; the document has at least one cell.
pub fn sanitize(notebook: &NotebookDoc) -> SanitizeReport {
	let mut report = SanitizeReport::default();
	let mut txn = notebook.doc.transact_mut_with(SANITIZE_ORIGIN);
	let mut seen_ids = std::collections::HashSet::new();

	let len = notebook.cells.len(&txn);
	for index in 0..len {
		let Some(Value::YMap(map)) = notebook.cells.get(&txn, index) else { continue };

		let current_id = map.get(&txn, CELL_ID_KEY).map(|v| v.to_string(&txn));
		let needs_new_id = match &current_id {
			None => true,
			Some(id) if id.is_empty() => true,
			Some(id) if !seen_ids.insert(id.clone()) => {
				report.deduplicated_ids += 1;
				true
			}
			Some(id) => {
				seen_ids.insert(id.clone());
				false
			}
		};
		if needs_new_id {
			let fresh = mint_cell_id();
			seen_ids.insert(fresh.clone());
			map.insert(&mut txn, CELL_ID_KEY, Any::from(fresh));
			report.assigned_ids += 1;
		}

		let current_type = map.get(&txn, CELL_TYPE_KEY).map(|v| v.to_string(&txn));
		let recognized = matches!(current_type.as_deref(), Some("code") | Some("markdown"));
		if !recognized {
			let coerced = CellType::coerce(current_type.as_deref().unwrap_or(""));
			map.insert(&mut txn, CELL_TYPE_KEY, Any::from(coerced.as_str()));
			report.coerced_types += 1;
		}

		if !matches!(map.get(&txn, CELL_CONTENT_KEY), Some(Value::YText(_))) {
			map.insert(&mut txn, CELL_CONTENT_KEY, TextPrelim::new(""));
		}
	}

	if notebook.cells.len(&txn) == 0 {
		let cell = MapPrelim::from([
			(CELL_ID_KEY.to_string(), Any::from(mint_cell_id())),
			(CELL_TYPE_KEY.to_string(), Any::from(CellType::Code.as_str())),
		]);
		let cell_ref: MapRef = notebook.cells.insert(&mut txn, 0, cell);
		let _text: TextRef = cell_ref.insert(&mut txn, CELL_CONTENT_KEY, TextPrelim::new(""));
		report.inserted_default_cell = true;
	}

	report
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::doc::{CellType, NotebookDoc};

	#[test]
	fn running_twice_is_idempotent() {
		let notebook = NotebookDoc::new();
		notebook.seed_default();
		let first = sanitize(&notebook);
		assert!(first.is_clean());
		let second = sanitize(&notebook);
		assert!(second.is_clean());
	}

	#[test]
	fn assigns_missing_ids_and_dedupes() {
		let notebook = NotebookDoc::new();
		let mut txn = notebook.doc.transact_mut();
		let a = MapPrelim::from([("id".to_string(), Any::from("dup")), ("type".to_string(), Any::from("code"))]);
		let a_ref: MapRef = notebook.cells.insert(&mut txn, 0, a);
		a_ref.insert(&mut txn, "content", TextPrelim::new(""));
		let b = MapPrelim::from([("id".to_string(), Any::from("dup")), ("type".to_string(), Any::from("code"))]);
		let b_ref: MapRef = notebook.cells.insert(&mut txn, 1, b);
		b_ref.insert(&mut txn, "content", TextPrelim::new(""));
		drop(txn);

		let report = sanitize(&notebook);
		assert_eq!(report.deduplicated_ids, 1);

		let ids: Vec<_> = notebook.cells_view().into_iter().map(|c| c.id).collect();
		assert_ne!(ids[0], ids[1]);
	}

	#[test]
	fn coerces_unknown_type_and_fills_empty_doc() {
		let notebook = NotebookDoc::new();
		let report = sanitize(&notebook);
		assert!(report.inserted_default_cell);
		assert_eq!(notebook.cells_view()[0].cell_type, CellType::Code);
	}
}

// vim: ts=4
