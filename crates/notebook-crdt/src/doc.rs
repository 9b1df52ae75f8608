//! The CRDT-backed notebook document (spec §3 Data model).
//!
//! `title` is collaborative text; `cells` is an ordered array of maps, each
//! holding `id` (plain string), `type` (plain string, coerced to the enum by
//! `sanitize`) and `content` (collaborative text).

use notebook_types::prelude::*;
use yrs::types::{ToJson, Value};
use yrs::{
	Any, Array, ArrayPrelim, ArrayRef, Doc, GetString, Map, MapPrelim, MapRef, ReadTxn, StateVector,
	Text, TextPrelim, TextRef, Transact, TransactionMut, Update,
	updates::decoder::Decode,
	updates::encoder::Encode,
};

pub const TITLE_KEY: &str = "title";
pub const CELLS_KEY: &str = "cells";
pub const CELL_ID_KEY: &str = "id";
pub const CELL_TYPE_KEY: &str = "type";
pub const CELL_CONTENT_KEY: &str = "content";

pub const DEFAULT_TITLE: &str = "Untitled Notebook";
pub const WELCOME_CELL_PREFIX: &str = "# New Notebook";
pub const PLACEHOLDER_CELL_PREFIX: &str = "# Write Python code here";

/// `Cell.type` enum (spec §3). Any other wire value is coerced to `Code`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
	Code,
	Markdown,
}

impl CellType {
	pub fn as_str(self) -> &'static str {
		match self {
			CellType::Code => "code",
			CellType::Markdown => "markdown",
		}
	}

	/// Any value other than the exact string `"markdown"` coerces to `Code`.
	pub fn coerce(value: &str) -> Self {
		match value {
			"markdown" => CellType::Markdown,
			_ => CellType::Code,
		}
	}
}

/// A read-only snapshot of one cell, for client-facing views and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellView {
	pub id: String,
	pub cell_type: CellType,
	pub content: String,
}

/// Thin wrapper over a `yrs::Doc` exposing the two top-level fields spec §3
/// requires. Cheap to clone (it's a handle, like `yrs::Doc` itself).
#[derive(Clone)]
pub struct NotebookDoc {
	pub doc: Doc,
	pub title: TextRef,
	pub cells: ArrayRef,
}

impl NotebookDoc {
	/// Create an empty document (no default content seeded yet).
	pub fn new() -> Self {
		let doc = Doc::new();
		let title = doc.get_or_insert_text(TITLE_KEY);
		let cells = doc.get_or_insert_array(CELLS_KEY);
		NotebookDoc { doc, title, cells }
	}

	/// Rehydrate a document from a persisted state-as-update snapshot
	/// (spec §4.2 step 1: hydrate).
	pub fn from_update(bytes: &[u8]) -> Result<Self> {
		let notebook = NotebookDoc::new();
		let update = Update::decode_v1(bytes).map_err(|e| Error::Storage(e.to_string()))?;
		let mut txn = notebook.doc.transact_mut();
		txn.apply_update(update).map_err(|e| Error::Storage(e.to_string()))?;
		drop(txn);
		Ok(notebook)
	}

	/// The default seeded notebook (spec §3 Lifecycle / Data model).
	pub fn seed_default(&self) {
		let mut txn = self.doc.transact_mut();
		self.title.insert(&mut txn, 0, DEFAULT_TITLE);

		let welcome = MapPrelim::from([
			(CELL_ID_KEY.to_string(), Any::from(mint_cell_id())),
			(CELL_TYPE_KEY.to_string(), Any::from(CellType::Markdown.as_str())),
		]);
		let welcome_ref: MapRef = self.cells.insert(&mut txn, 0, welcome);
		let welcome_text = welcome_ref.insert(&mut txn, CELL_CONTENT_KEY, TextPrelim::new(""));
		welcome_text.insert(
			&mut txn,
			0,
			&format!("{WELCOME_CELL_PREFIX}\n\nWelcome! Start writing here, or add a code cell below."),
		);

		let code = MapPrelim::from([
			(CELL_ID_KEY.to_string(), Any::from(mint_cell_id())),
			(CELL_TYPE_KEY.to_string(), Any::from(CellType::Code.as_str())),
		]);
		let code_ref: MapRef = self.cells.insert(&mut txn, 1, code);
		let code_text = code_ref.insert(&mut txn, CELL_CONTENT_KEY, TextPrelim::new(""));
		code_text.insert(&mut txn, 0, &format!("{PLACEHOLDER_CELL_PREFIX}\nprint(\"hello\")"));
	}

	pub fn title_string(&self) -> String {
		let txn = self.doc.transact();
		self.title.get_string(&txn)
	}

	pub fn cell_count(&self) -> usize {
		let txn = self.doc.transact();
		self.cells.len(&txn) as usize
	}

	/// Read every cell in document order.
	pub fn cells_view(&self) -> Vec<CellView> {
		let txn = self.doc.transact();
		let mut out = Vec::with_capacity(self.cells.len(&txn) as usize);
		for item in self.cells.iter(&txn) {
			if let Value::YMap(map) = item {
				out.push(read_cell(&txn, &map));
			}
		}
		out
	}

	/// State vector for this replica (spec §4.1 sync step 1).
	pub fn state_vector(&self) -> StateVector {
		self.doc.transact().state_vector()
	}

	/// Full document state, used for persistence snapshots and sync step 2
	/// replies relative to a remote state vector.
	pub fn encode_diff(&self, remote_sv: &StateVector) -> Vec<u8> {
		self.doc.transact().encode_diff_v1(remote_sv)
	}

	pub fn encode_state_as_update(&self) -> Vec<u8> {
		self.doc.transact().encode_state_as_update_v1(&StateVector::default())
	}

	/// Apply an incoming update. `origin` is recorded on the transaction so
	/// observers can suppress echo back to the socket that sent it.
	pub fn apply_update_with_origin(&self, bytes: &[u8], origin: u64) -> Result<()> {
		let update = Update::decode_v1(bytes).map_err(|_| Error::MalformedFrame)?;
		let mut txn = self.doc.transact_mut_with(origin);
		txn.apply_update(update).map_err(|_| Error::MalformedFrame)?;
		Ok(())
	}

	/// Run a closure inside a single transaction tagged with `origin`, used
	/// by sanitize and by client-side mutation helpers.
	pub fn with_transact_mut<F, T>(&self, origin: u64, f: F) -> T
	where
		F: FnOnce(&mut TransactionMut) -> T,
	{
		let mut txn = self.doc.transact_mut_with(origin);
		f(&mut txn)
	}

	fn cell_index<T: ReadTxn>(&self, txn: &T, cell_id: &str) -> Option<(u32, MapRef)> {
		for index in 0..self.cells.len(txn) {
			if let Some(Value::YMap(map)) = self.cells.get(txn, index) {
				if map.get(txn, CELL_ID_KEY).map(|v| v.to_string(txn)).as_deref() == Some(cell_id) {
					return Some((index, map));
				}
			}
		}
		None
	}

	/// Insert a new cell after `after_cell_id` (or at the end if `None` or
	/// not found), returning its freshly minted id (spec §4.4 "Insert cell").
	pub fn insert_cell(&self, after_cell_id: Option<&str>, cell_type: CellType) -> String {
		let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
		let index = after_cell_id
			.and_then(|id| self.cell_index(&txn, id))
			.map_or_else(|| self.cells.len(&txn), |(i, _)| i + 1);

		let id = mint_cell_id();
		let cell = MapPrelim::from([
			(CELL_ID_KEY.to_string(), Any::from(id.clone())),
			(CELL_TYPE_KEY.to_string(), Any::from(cell_type.as_str())),
		]);
		let cell_ref: MapRef = self.cells.insert(&mut txn, index, cell);
		cell_ref.insert(&mut txn, CELL_CONTENT_KEY, TextPrelim::new(""));
		id
	}

	/// Delete a cell by id. Refuses if it would drop the document below one
	/// cell (spec §4.4, §8 boundary behavior). A missing id is a no-op.
	pub fn delete_cell(&self, cell_id: &str) -> Result<()> {
		let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
		if self.cells.len(&txn) <= 1 {
			return Err(Error::InvalidMutation("cannot delete the last remaining cell".to_string()));
		}
		if let Some((index, _)) = self.cell_index(&txn, cell_id) {
			self.cells.remove(&mut txn, index);
		}
		Ok(())
	}

	/// Move a cell to `new_index` by deleting and reinserting it (spec §4.4
	/// "Move cell"). A missing id is a no-op.
	pub fn move_cell(&self, cell_id: &str, new_index: usize) {
		let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
		let Some((old_index, map)) = self.cell_index(&txn, cell_id) else { return };

		let cell_type =
			map.get(&txn, CELL_TYPE_KEY).map(|v| CellType::coerce(&v.to_string(&txn))).unwrap_or(CellType::Code);
		let content = match map.get(&txn, CELL_CONTENT_KEY) {
			Some(Value::YText(text)) => text.get_string(&txn),
			_ => String::new(),
		};

		self.cells.remove(&mut txn, old_index);
		let target = (new_index as u32).min(self.cells.len(&txn));

		let cell = MapPrelim::from([
			(CELL_ID_KEY.to_string(), Any::from(cell_id.to_string())),
			(CELL_TYPE_KEY.to_string(), Any::from(cell_type.as_str())),
		]);
		let cell_ref: MapRef = self.cells.insert(&mut txn, target, cell);
		let text_ref = cell_ref.insert(&mut txn, CELL_CONTENT_KEY, TextPrelim::new(""));
		if !content.is_empty() {
			text_ref.insert(&mut txn, 0, &content);
		}
	}

	/// Change a cell's type (spec §4.4 "Change type"; clearing the runtime
	/// fields for the cell is the caller's responsibility, since runtime
	/// state lives outside the CRDT). A missing id is a no-op.
	pub fn set_cell_type(&self, cell_id: &str, cell_type: CellType) {
		let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
		if let Some((_, map)) = self.cell_index(&txn, cell_id) {
			map.insert(&mut txn, CELL_TYPE_KEY, Any::from(cell_type.as_str()));
		}
	}

	/// Replace a cell's content with `next`, applying only the shortest
	/// common-prefix/suffix diff (spec §4.4 "Update content"). A missing id
	/// is a no-op.
	pub fn update_cell_content(&self, cell_id: &str, next: &str) {
		let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
		let Some((_, map)) = self.cell_index(&txn, cell_id) else { return };
		let Some(Value::YText(text_ref)) = map.get(&txn, CELL_CONTENT_KEY) else { return };
		let current = text_ref.get_string(&txn);
		apply_text_diff(&text_ref, &mut txn, &current, next);
	}

	/// Replace the title with `next` using the same diff strategy as
	/// [`NotebookDoc::update_cell_content`] (spec §4.4 "Update title").
	pub fn update_title(&self, next: &str) {
		let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
		let current = self.title.get_string(&txn);
		apply_text_diff(&self.title, &mut txn, &current, next);
	}
}

/// Origin tag for local, client-originated mutations. Distinct from
/// `sanitize::SANITIZE_ORIGIN` (0) and the coordinator's own remote-update
/// origin tag (1) — the two sides never need to agree on these values, only
/// to each be internally consistent.
pub const LOCAL_ORIGIN: u64 = 2;

/// Apply the shortest common-prefix/suffix diff between `current` and `next`
/// to `text` (spec §4.4): minimizes CRDT traffic and preserves concurrent
/// peers' insertion intent on the untouched regions.
fn apply_text_diff(text: &TextRef, txn: &mut TransactionMut, current: &str, next: &str) {
	if current == next {
		return;
	}
	let current_chars: Vec<char> = current.chars().collect();
	let next_chars: Vec<char> = next.chars().collect();
	let max_common = current_chars.len().min(next_chars.len());

	let prefix = current_chars.iter().zip(next_chars.iter()).take_while(|(a, b)| a == b).count();
	let mut suffix = 0;
	while suffix < max_common - prefix
		&& current_chars[current_chars.len() - 1 - suffix] == next_chars[next_chars.len() - 1 - suffix]
	{
		suffix += 1;
	}

	let delete_len = current_chars.len() - prefix - suffix;
	if delete_len > 0 {
		text.remove_range(txn, prefix as u32, delete_len as u32);
	}
	let insert: String = next_chars[prefix..next_chars.len() - suffix].iter().collect();
	if !insert.is_empty() {
		text.insert(txn, prefix as u32, &insert);
	}
}

impl Default for NotebookDoc {
	fn default() -> Self {
		Self::new()
	}
}

fn read_cell<T: ReadTxn>(txn: &T, map: &MapRef) -> CellView {
	let id = map
		.get(txn, CELL_ID_KEY)
		.and_then(|v| v.to_string(txn).into())
		.unwrap_or_default();
	let cell_type = map
		.get(txn, CELL_TYPE_KEY)
		.map(|v| CellType::coerce(&v.to_string(txn)))
		.unwrap_or(CellType::Code);
	let content = match map.get(txn, CELL_CONTENT_KEY) {
		Some(Value::YText(text)) => text.get_string(txn),
		Some(other) => other.to_string(txn),
		None => String::new(),
	};
	CellView { id, cell_type, content }
}

const CELL_ID_LEN: usize = 12;
const CELL_ID_ALPHABET: [char; 62] = [
	'0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
	'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
	'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U',
	'V', 'W', 'X', 'Y', 'Z',
];

/// Mint a fresh, opaque cell id. Grounded on the teacher's own
/// `random_id()` helper (`server/src/core/utils.rs`).
pub fn mint_cell_id() -> String {
	use rand::Rng;
	let mut rng = rand::rng();
	let mut out = String::with_capacity(CELL_ID_LEN);
	for _ in 0..CELL_ID_LEN {
		out.push(CELL_ID_ALPHABET[rng.random_range(0..CELL_ID_ALPHABET.len())]);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn seed_default_matches_spec_template() {
		let doc = NotebookDoc::new();
		doc.seed_default();
		assert_eq!(doc.title_string(), DEFAULT_TITLE);
		let cells = doc.cells_view();
		assert_eq!(cells.len(), 2);
		assert_eq!(cells[0].cell_type, CellType::Markdown);
		assert!(cells[0].content.starts_with(WELCOME_CELL_PREFIX));
		assert_eq!(cells[1].cell_type, CellType::Code);
		assert!(cells[1].content.starts_with(PLACEHOLDER_CELL_PREFIX));
		assert_ne!(cells[0].id, cells[1].id);
		assert!(!cells[0].id.is_empty());
	}

	#[test]
	fn persist_then_hydrate_round_trips() {
		let doc = NotebookDoc::new();
		doc.seed_default();
		let bytes = doc.encode_state_as_update();

		let rehydrated = NotebookDoc::from_update(&bytes).expect("decodes");
		assert_eq!(rehydrated.title_string(), DEFAULT_TITLE);
		assert_eq!(rehydrated.cells_view(), doc.cells_view());
	}

	#[test]
	fn cell_type_coerces_unknown_values_to_code() {
		assert_eq!(CellType::coerce("markdown"), CellType::Markdown);
		assert_eq!(CellType::coerce("code"), CellType::Code);
		assert_eq!(CellType::coerce("whiteboard"), CellType::Code);
		assert_eq!(CellType::coerce(""), CellType::Code);
	}

	#[test]
	fn insert_cell_places_it_after_the_given_id() {
		let doc = NotebookDoc::new();
		doc.seed_default();
		let first_id = doc.cells_view()[0].id.clone();

		let new_id = doc.insert_cell(Some(&first_id), CellType::Code);

		let cells = doc.cells_view();
		assert_eq!(cells.len(), 3);
		assert_eq!(cells[1].id, new_id);
		assert_eq!(cells[1].cell_type, CellType::Code);
		assert_eq!(cells[1].content, "");
	}

	#[test]
	fn insert_cell_with_no_anchor_appends_at_end() {
		let doc = NotebookDoc::new();
		doc.seed_default();
		let new_id = doc.insert_cell(None, CellType::Markdown);
		let cells = doc.cells_view();
		assert_eq!(cells.last().unwrap().id, new_id);
	}

	#[test]
	fn delete_cell_refuses_to_drop_below_one() {
		let doc = NotebookDoc::new();
		let only_id = doc.insert_cell(None, CellType::Code);
		assert!(doc.delete_cell(&only_id).is_err());
		assert_eq!(doc.cell_count(), 1);
	}

	#[test]
	fn delete_cell_removes_the_named_cell_only() {
		let doc = NotebookDoc::new();
		doc.seed_default();
		let target = doc.cells_view()[0].id.clone();
		let keep = doc.cells_view()[1].id.clone();

		doc.delete_cell(&target).expect("deletes");

		let cells = doc.cells_view();
		assert_eq!(cells.len(), 1);
		assert_eq!(cells[0].id, keep);
	}

	#[test]
	fn move_cell_relocates_without_losing_content() {
		let doc = NotebookDoc::new();
		doc.seed_default();
		let first = doc.cells_view()[0].clone();

		doc.move_cell(&first.id, 1);

		let cells = doc.cells_view();
		assert_eq!(cells[1].id, first.id);
		assert_eq!(cells[1].content, first.content);
		assert_eq!(cells[1].cell_type, first.cell_type);
	}

	#[test]
	fn set_cell_type_updates_in_place() {
		let doc = NotebookDoc::new();
		let id = doc.insert_cell(None, CellType::Code);
		doc.set_cell_type(&id, CellType::Markdown);
		assert_eq!(doc.cells_view()[0].cell_type, CellType::Markdown);
	}

	#[test]
	fn update_cell_content_applies_minimal_diff() {
		let doc = NotebookDoc::new();
		let id = doc.insert_cell(None, CellType::Code);
		doc.update_cell_content(&id, "hello world");
		doc.update_cell_content(&id, "hello brave world");
		assert_eq!(doc.cells_view()[0].content, "hello brave world");
	}

	#[test]
	fn update_title_applies_minimal_diff() {
		let doc = NotebookDoc::new();
		doc.seed_default();
		doc.update_title("My Notebook");
		assert_eq!(doc.title_string(), "My Notebook");
	}

	#[test]
	fn text_diff_handles_pure_append_prepend_and_middle_replacement() {
		let doc = NotebookDoc::new();
		doc.update_title("world");
		doc.update_title("hello world");
		assert_eq!(doc.title_string(), "hello world");

		doc.update_title("hello world!");
		assert_eq!(doc.title_string(), "hello world!");

		doc.update_title("hello brave world!");
		assert_eq!(doc.title_string(), "hello brave world!");
	}

	#[test]
	fn text_diff_is_a_no_op_when_content_is_unchanged() {
		let doc = NotebookDoc::new();
		doc.update_title("steady");
		let before = doc.state_vector();
		doc.update_title("steady");
		assert_eq!(doc.state_vector(), before);
	}
}

// vim: ts=4
