//! Strict 7-step bootstrap sequence (spec §4.4):
//!
//! 1. create a fresh CRDT document
//! 2. (collab configured) build a provider with `connect=false`
//! 3. try the gateway's HTTP snapshot fallback
//! 4. else try local storage
//! 5. else try external storage
//! 6. else seed the default template
//! 7. sanitize, then let the caller call `connect()`
//!
//! `LocalStore`/`ExternalStore` are injected so a native host and a wasm32
//! embedder (browser `IndexedDB`, a blob-store HTTP client) can each supply
//! their own storage without this crate depending on either.

use async_trait::async_trait;
use notebook_crdt::doc::{CellType, DEFAULT_TITLE, PLACEHOLDER_CELL_PREFIX, WELCOME_CELL_PREFIX};
use notebook_crdt::{sanitize, NotebookDoc, SanitizeReport};
use notebook_types::prelude::*;

#[async_trait]
pub trait LocalStore: Send + Sync {
	async fn load(&self, notebook_id: &NotebookId) -> Result<Option<Vec<u8>>>;
	async fn save(&self, notebook_id: &NotebookId, snapshot: &[u8]) -> Result<()>;
}

#[async_trait]
pub trait ExternalStore: Send + Sync {
	async fn load(&self, notebook_id: &NotebookId) -> Result<Option<Vec<u8>>>;
	async fn save(&self, notebook_id: &NotebookId, snapshot: &[u8]) -> Result<()>;
}

/// Which source the bootstrapped document actually came from; drives the
/// initial `collabStatus` (spec §4.4's `connecting` vs `fallback` framing is
/// about the live socket, not this one-shot bootstrap, but callers still
/// want to know whether they're starting from someone else's state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapSource {
	Remote,
	Local,
	External,
	Default,
}

pub struct BootstrapResult {
	pub doc: NotebookDoc,
	pub source: BootstrapSource,
	pub sanitize_report: SanitizeReport,
}

/// Fetch the gateway's HTTP snapshot fallback (step 3). A non-2xx or decode
/// failure is treated as "try the next source", not a hard error.
pub async fn fetch_remote_snapshot(
	http: &reqwest::Client,
	collab_server_url: &str,
	notebook_id: &NotebookId,
	auth_token: &str,
	timeout: std::time::Duration,
) -> Option<Vec<u8>> {
	let url = format!("{}/{}/snapshot?token={}", collab_server_url.trim_end_matches('/'), notebook_id, auth_token);
	let response = http.get(&url).timeout(timeout).send().await.ok()?;
	if !response.status().is_success() {
		return None;
	}
	response.bytes().await.ok().map(|b| b.to_vec())
}

/// Run steps 3-7 given a set of already-fetched candidate snapshots, in
/// priority order: remote, local, external. Steps 1/2 (fresh doc creation,
/// provider wiring) are the caller's (`ClientSession`'s) responsibility,
/// since they involve wiring up listeners this crate doesn't own.
pub fn resolve(remote: Option<Vec<u8>>, local: Option<Vec<u8>>, external: Option<Vec<u8>>) -> BootstrapResult {
	let (bytes, source) = if remote.is_some() {
		(remote, BootstrapSource::Remote)
	} else if local.is_some() {
		(local.clone(), BootstrapSource::Local)
	} else if external.is_some() {
		(external.clone(), BootstrapSource::External)
	} else {
		(None, BootstrapSource::Default)
	};

	let doc = match bytes {
		Some(bytes) => match NotebookDoc::from_update(&bytes) {
			Ok(doc) => doc,
			Err(err) => {
				warn!(%err, ?source, "failed to decode bootstrap snapshot, falling back to default template");
				let doc = NotebookDoc::new();
				doc.seed_default();
				return BootstrapResult { sanitize_report: sanitize(&doc), doc, source: BootstrapSource::Default };
			}
		},
		None => {
			let doc = NotebookDoc::new();
			doc.seed_default();
			doc
		}
	};

	// Step 5 (spec §4.4): a remote/local snapshot that turns out to just be
	// the default template (a coordinator that itself never saw real content)
	// shouldn't shadow a genuine non-default snapshot sitting in external or
	// local storage. Re-seed from whichever of those is available, preferring
	// external.
	let (doc, source) = if is_default_template(&doc)
		&& let Some(rescue) = external.as_deref().or(local.as_deref())
		&& let Ok(rescued) = NotebookDoc::from_update(rescue)
		&& !is_default_template(&rescued)
	{
		let rescued_source =
			if external.as_deref().is_some_and(|bytes| bytes == rescue) { BootstrapSource::External } else { BootstrapSource::Local };
		(rescued, rescued_source)
	} else {
		(doc, source)
	};

	let sanitize_report = sanitize(&doc);
	BootstrapResult { doc, source, sanitize_report }
}

/// True when `doc` is indistinguishable from a freshly `seed_default()`ed
/// document: matching title and the two seeded cells' type/prefix.
fn is_default_template(doc: &NotebookDoc) -> bool {
	if doc.title_string() != DEFAULT_TITLE {
		return false;
	}
	let cells = doc.cells_view();
	cells.len() == 2
		&& cells[0].cell_type == CellType::Markdown
		&& cells[0].content.starts_with(WELCOME_CELL_PREFIX)
		&& cells[1].cell_type == CellType::Code
		&& cells[1].content.starts_with(PLACEHOLDER_CELL_PREFIX)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn encode(doc: &NotebookDoc) -> Vec<u8> {
		doc.encode_state_as_update()
	}

	#[test]
	fn prefers_remote_over_local_and_external() {
		let remote_doc = NotebookDoc::new();
		remote_doc.seed_default();
		let result = resolve(Some(encode(&remote_doc)), Some(vec![1, 2, 3]), Some(vec![4, 5, 6]));
		assert_eq!(result.source, BootstrapSource::Remote);
	}

	#[test]
	fn falls_back_to_local_when_remote_absent() {
		let local_doc = NotebookDoc::new();
		local_doc.seed_default();
		let result = resolve(None, Some(encode(&local_doc)), Some(vec![9, 9, 9]));
		assert_eq!(result.source, BootstrapSource::Local);
	}

	#[test]
	fn falls_back_to_external_when_remote_and_local_absent() {
		let external_doc = NotebookDoc::new();
		external_doc.seed_default();
		let result = resolve(None, None, Some(encode(&external_doc)));
		assert_eq!(result.source, BootstrapSource::External);
	}

	#[test]
	fn falls_back_to_default_template_when_nothing_available() {
		let result = resolve(None, None, None);
		assert_eq!(result.source, BootstrapSource::Default);
		assert_eq!(result.doc.cell_count(), 2);
	}

	#[test]
	fn rescues_from_external_when_remote_snapshot_is_just_the_default_template() {
		let remote_doc = NotebookDoc::new();
		remote_doc.seed_default();

		let external_doc = NotebookDoc::new();
		external_doc.update_title("Real Work");

		let result = resolve(Some(encode(&remote_doc)), None, Some(encode(&external_doc)));
		assert_eq!(result.source, BootstrapSource::External);
		assert_eq!(result.doc.title_string(), "Real Work");
	}

	#[test]
	fn rescues_from_local_when_remote_is_default_and_external_absent() {
		let remote_doc = NotebookDoc::new();
		remote_doc.seed_default();

		let local_doc = NotebookDoc::new();
		local_doc.update_title("Local Work");

		let result = resolve(Some(encode(&remote_doc)), Some(encode(&local_doc)), None);
		assert_eq!(result.source, BootstrapSource::Local);
		assert_eq!(result.doc.title_string(), "Local Work");
	}

	#[test]
	fn keeps_default_template_when_no_rescue_snapshot_is_non_default() {
		let remote_doc = NotebookDoc::new();
		remote_doc.seed_default();

		let result = resolve(Some(encode(&remote_doc)), None, None);
		assert_eq!(result.source, BootstrapSource::Remote);
		assert_eq!(result.doc.cell_count(), 2);
	}

	#[test]
	fn duplicate_cell_ids_are_promoted_to_distinct_ids_on_bootstrap() {
		use yrs::{Any, Map, MapPrelim, MapRef, Transact, TextPrelim};

		let external_doc = NotebookDoc::new();
		let mut txn = external_doc.doc.transact_mut();
		let a = MapPrelim::from([("id".to_string(), Any::from("dup")), ("type".to_string(), Any::from("code"))]);
		let a_ref: MapRef = external_doc.cells.insert(&mut txn, 0, a);
		a_ref.insert(&mut txn, "content", TextPrelim::new(""));
		let b = MapPrelim::from([("id".to_string(), Any::from("dup")), ("type".to_string(), Any::from("code"))]);
		let b_ref: MapRef = external_doc.cells.insert(&mut txn, 1, b);
		b_ref.insert(&mut txn, "content", TextPrelim::new(""));
		drop(txn);

		let result = resolve(None, None, Some(encode(&external_doc)));
		assert_eq!(result.sanitize_report.deduplicated_ids, 1);

		let ids: Vec<_> = result.doc.cells_view().into_iter().map(|c| c.id).collect();
		assert_eq!(ids.len(), 2);
		assert_ne!(ids[0], ids[1]);
		assert!(ids.contains(&"dup".to_string()));
	}
}

// vim: ts=4
