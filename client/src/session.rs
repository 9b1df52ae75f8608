//! ClientSession (C4): owns one CRDT document bound to a notebook, its
//! websocket provider, awareness registry, runtime cell state, and the
//! kernel/collab connection state machines (spec §4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notebook_crdt::awareness::HEARTBEAT_INTERVAL_SECS;
use notebook_crdt::doc::CellType;
use notebook_crdt::{AwarenessRegistry, AwarenessState, Frame};
use notebook_types::prelude::*;
use tokio::sync::{mpsc, Mutex};

use crate::bootstrap::{fetch_remote_snapshot, resolve, BootstrapSource, ExternalStore, LocalStore};
use crate::config::ClientConfig;
use crate::kernel::{KernelClient, VariableInfo};
use crate::runtime::{CellOutput, RuntimeCellState, RuntimeState};
use crate::ws_provider::WsProvider;

/// One entry of the observable cell list (spec §4.4 "Sync from CRDT to
/// observable list"): a CRDT cell merged with its non-replicated runtime
/// fields.
#[derive(Debug, Clone)]
pub struct CellSnapshot {
	pub id: String,
	pub cell_type: CellType,
	pub content: String,
	pub runtime: RuntimeCellState,
}

/// Cadence of the dirty-check auto-save tick (spec §4.4 "Leader election for
/// external persistence"). Not itself spec-mandated; chosen well under the
/// 60s awareness staleness window so a leader handoff on disconnect doesn't
/// leave writes stranded for long.
const AUTO_SAVE_INTERVAL_SECS: u64 = 10;

/// `{disconnected -> loading -> idle <-> busy, starting}`, plus
/// `loading -> disconnected` on init failure (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStatus {
	Disconnected,
	Loading,
	Idle,
	Busy,
	Starting,
}

/// `{disabled, connecting, connected, fallback}` (spec §4.4). `connected`
/// never downgrades except by a new bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollabStatus {
	Disabled,
	Connecting,
	Connected,
	Fallback,
}

pub struct ClientSession {
	pub config: ClientConfig,
	/// Stable per-session identity used for awareness and leader election
	/// (spec's Open Question resolution: a nonce-suffixed id makes plain
	/// lexicographic ordering a total order in practice).
	pub client_id: String,
	pub doc: notebook_crdt::NotebookDoc,
	awareness: Mutex<AwarenessRegistry>,
	runtime: Mutex<RuntimeState>,
	kernel: Option<KernelClient>,
	kernel_status: Mutex<KernelStatus>,
	collab_status: Mutex<CollabStatus>,
	ws: Option<Arc<WsProvider>>,
	pub bootstrap_source: BootstrapSource,
	/// Cell id the UI currently has focused; preserved across view syncs if
	/// still present, else falls back to the first cell (spec §4.4).
	active_cell_id: Mutex<Option<String>>,
	execution_count: Mutex<u64>,
	variables: Mutex<Vec<VariableInfo>>,
	dirty: AtomicBool,
	local: Arc<dyn LocalStore>,
	external: Arc<dyn ExternalStore>,
}

impl ClientSession {
	/// Run the bootstrap sequence (spec §4.4 steps 1-7) and, if collaboration
	/// is configured, open the websocket provider.
	pub async fn start(
		config: ClientConfig,
		local: Arc<dyn LocalStore>,
		external: Arc<dyn ExternalStore>,
	) -> Result<Arc<Self>> {
		let client_id = notebook_crdt::doc::mint_cell_id();
		let collab_enabled = config.collab_enabled();

		let remote_bytes = if collab_enabled {
			let http = reqwest::Client::new();
			fetch_remote_snapshot(
				&http,
				config.collab_server_url.as_deref().unwrap_or_default(),
				&config.notebook_id,
				&config.auth_token,
				Duration::from_millis(config.collab_connect_timeout_ms),
			)
			.await
		} else {
			None
		};
		let local_bytes = local.load(&config.notebook_id).await.unwrap_or(None);
		let external_bytes = external.load(&config.notebook_id).await.unwrap_or(None);

		let bootstrap = resolve(remote_bytes, local_bytes, external_bytes);
		if !bootstrap.sanitize_report.is_clean() {
			warn!(notebook_id = %config.notebook_id, report = ?bootstrap.sanitize_report, "bootstrap sanitize repaired invariant violations");
		}

		let kernel = config.backend_kernel_url.as_ref().map(|url| KernelClient::new(url.clone()));

		let (ws, collab_status, inbound_rx) = if collab_enabled {
			let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
			let gateway_url = build_ws_url(
				config.collab_server_url.as_deref().unwrap_or_default(),
				&config.notebook_id,
				&config.auth_token,
			);
			let provider = Arc::new(WsProvider::new(gateway_url, inbound_tx));
			(Some(provider), CollabStatus::Connecting, Some(inbound_rx))
		} else {
			(None, CollabStatus::Disabled, None)
		};

		let session = Arc::new(ClientSession {
			client_id,
			awareness: Mutex::new(AwarenessRegistry::new()),
			runtime: Mutex::new(RuntimeState::new()),
			kernel,
			kernel_status: Mutex::new(KernelStatus::Disconnected),
			collab_status: Mutex::new(collab_status),
			doc: bootstrap.doc,
			ws,
			bootstrap_source: bootstrap.source,
			active_cell_id: Mutex::new(None),
			execution_count: Mutex::new(0),
			variables: Mutex::new(Vec::new()),
			dirty: AtomicBool::new(false),
			local,
			external,
			config,
		});

		if let Some(ws) = &session.ws {
			ws.connect();
			tokio::spawn(heartbeat_loop(session.clone()));
		}
		if let Some(mut inbound_rx) = inbound_rx {
			let session = session.clone();
			tokio::spawn(async move {
				while let Some(frame) = inbound_rx.recv().await {
					apply_inbound_frame(&session, frame).await;
				}
			});
		}
		tokio::spawn(auto_save_loop(session.clone()));

		Ok(session)
	}

	pub async fn kernel_status(&self) -> KernelStatus {
		*self.kernel_status.lock().await
	}

	pub async fn collab_status(&self) -> CollabStatus {
		*self.collab_status.lock().await
	}

	pub async fn set_collab_status(&self, status: CollabStatus) {
		let mut current = self.collab_status.lock().await;
		// `connected` never downgrades except by a new bootstrap (spec §4.4).
		if *current == CollabStatus::Connected && status != CollabStatus::Connected {
			return;
		}
		*current = status;
	}

	/// Peer count including self, excluding stale ghosts (spec §4.4: "report
	/// `max(1, |active|)`").
	pub async fn peer_count(&self) -> usize {
		let registry = self.awareness.lock().await;
		let now = Timestamp::now();
		let others = registry.states().filter(|s| s.timestamp.elapsed_secs(now) <= 60).count();
		(others + 1).max(1)
	}

	/// Leader election for external persistence (spec §4.4): the numerically
	/// smallest active client id wins, falling back to self if alone.
	pub async fn is_leader(&self) -> bool {
		let registry = self.awareness.lock().await;
		match registry.leader() {
			Some(leader) => leader <= self.client_id.as_str(),
			None => true,
		}
	}

	pub fn kernel(&self) -> Option<&KernelClient> {
		self.kernel.as_ref()
	}

	pub async fn runtime_state(&self) -> tokio::sync::MutexGuard<'_, RuntimeState> {
		self.runtime.lock().await
	}

	/// Coalesced sync from the CRDT into the observable cell list (spec
	/// §4.4). Callers debounce the cadence at which they invoke this (one
	/// animation frame in the source UI); the merge itself is synchronous
	/// and cheap since `NotebookDoc::cells_view` already walks the document
	/// once. Also prunes/seeds `RuntimeCellState` entries and resolves the
	/// active cell id.
	pub async fn sync_view(&self) -> Vec<CellSnapshot> {
		let cells = self.doc.cells_view();
		let ids: Vec<String> = cells.iter().map(|c| c.id.clone()).collect();

		let mut runtime = self.runtime.lock().await;
		runtime.prune(&ids);
		for id in &ids {
			if runtime.get(id).is_none() {
				runtime.set(id.clone(), RuntimeCellState::idle());
			}
		}

		let mut active = self.active_cell_id.lock().await;
		let still_present = active.as_deref().is_some_and(|id| ids.iter().any(|c| c == id));
		if !still_present {
			*active = ids.first().cloned();
		}
		drop(active);

		cells
			.into_iter()
			.map(|c| CellSnapshot {
				runtime: runtime.get(&c.id).cloned().unwrap_or_else(RuntimeCellState::idle),
				id: c.id,
				cell_type: c.cell_type,
				content: c.content,
			})
			.collect()
	}

	pub async fn active_cell_id(&self) -> Option<String> {
		self.active_cell_id.lock().await.clone()
	}

	pub async fn set_active_cell_id(&self, cell_id: impl Into<String>) {
		*self.active_cell_id.lock().await = Some(cell_id.into());
	}

	/// Insert cell (spec §4.4): new cells start `idle`.
	pub async fn insert_cell(&self, after_cell_id: Option<&str>, cell_type: CellType) -> String {
		let id = self.doc.insert_cell(after_cell_id, cell_type);
		self.runtime.lock().await.set(id.clone(), RuntimeCellState::idle());
		self.mark_dirty();
		id
	}

	/// Delete cell (spec §4.4): refuses below one cell; runtime state for
	/// the removed id is reaped on the next [`Self::sync_view`].
	pub async fn delete_cell(&self, cell_id: &str) -> Result<()> {
		self.doc.delete_cell(cell_id)?;
		self.mark_dirty();
		Ok(())
	}

	pub fn move_cell(&self, cell_id: &str, new_index: usize) {
		self.doc.move_cell(cell_id, new_index);
		self.mark_dirty();
	}

	/// Change type (spec §4.4): also clears runtime output/status/executionCount.
	pub async fn change_cell_type(&self, cell_id: &str, cell_type: CellType) {
		self.doc.set_cell_type(cell_id, cell_type);
		self.runtime.lock().await.set(cell_id.to_string(), RuntimeCellState::idle());
		self.mark_dirty();
	}

	pub fn update_cell_content(&self, cell_id: &str, next: &str) {
		self.doc.update_cell_content(cell_id, next);
		self.mark_dirty();
	}

	pub fn update_title(&self, next: &str) {
		self.doc.update_title(next);
		self.mark_dirty();
	}

	/// Marks the session dirty for the next auto-save tick (spec §4.4
	/// bootstrap step 1's update listener, generalized to every local or
	/// remote mutation rather than wired through a yrs update observer —
	/// every mutation path in this module already funnels through here).
	fn mark_dirty(&self) {
		self.dirty.store(true, Ordering::Relaxed);
	}

	/// Execute a cell against the backend kernel (spec §4.4 "Execution").
	/// Captures the cell's current text straight from the CRDT, never from
	/// a cached view, since the view can lag a concurrent remote edit.
	pub async fn execute_cell(&self, cell_id: &str, advance: bool) -> Result<()> {
		let Some(kernel) = &self.kernel else {
			return Err(Error::Misconfigured("no backend kernel configured".to_string()));
		};
		let code = self
			.doc
			.cells_view()
			.into_iter()
			.find(|c| c.id == cell_id)
			.map(|c| c.content)
			.unwrap_or_default();

		self.runtime.lock().await.set(cell_id.to_string(), RuntimeCellState::running());
		*self.kernel_status.lock().await = KernelStatus::Busy;

		let result = kernel.execute(cell_id, &code).await;
		*self.kernel_status.lock().await = KernelStatus::Idle;

		match result {
			Ok(executed) => {
				let output = serde_json::from_value(executed.output)
					.unwrap_or_else(|_| CellOutput::error("malformed kernel output"));
				*self.execution_count.lock().await = executed.execution_count;
				self.runtime.lock().await.set(
					cell_id.to_string(),
					RuntimeCellState::success(output, executed.execution_count),
				);
				if let Ok(vars) = kernel.variables().await {
					*self.variables.lock().await = vars;
				}
				if advance {
					self.advance_past(cell_id).await;
				}
				Ok(())
			}
			Err(err) => {
				self.runtime
					.lock()
					.await
					.set(cell_id.to_string(), RuntimeCellState::failed(CellOutput::error(err.to_string())));
				Err(err)
			}
		}
	}

	pub async fn execution_count(&self) -> u64 {
		*self.execution_count.lock().await
	}

	pub async fn variables(&self) -> Vec<VariableInfo> {
		self.variables.lock().await.clone()
	}

	/// On `advance=true`: focus the next cell, or insert a fresh code cell
	/// after the executed one if it was the last (spec §4.4).
	async fn advance_past(&self, cell_id: &str) {
		let cells = self.doc.cells_view();
		let Some(index) = cells.iter().position(|c| c.id == cell_id) else { return };
		let next_id = match cells.get(index + 1) {
			Some(next) => next.id.clone(),
			None => self.insert_cell(Some(cell_id), CellType::Code).await,
		};
		self.set_active_cell_id(next_id).await;
	}
}

fn build_ws_url(collab_server_url: &str, notebook_id: &NotebookId, token: &str) -> String {
	let scheme_stripped = collab_server_url.replacen("https://", "wss://", 1).replacen("http://", "ws://", 1);
	format!("{}/ws/{}?token={}", scheme_stripped.trim_end_matches('/'), notebook_id, token)
}

async fn heartbeat_loop(session: Arc<ClientSession>) {
	let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS as u64));
	loop {
		ticker.tick().await;
		let Some(ws) = &session.ws else { return };
		let heartbeat = AwarenessState {
			client_id: session.client_id.clone(),
			state: serde_json::json!({ "hb": Timestamp::now().0 }),
			timestamp: Timestamp::now(),
		};
		session.awareness.lock().await.apply(heartbeat.clone());
		if let Ok(bytes) = serde_json::to_vec(&heartbeat) {
			ws.send(notebook_crdt::protocol::encode_awareness(&bytes));
		}
	}
}

/// Writes a local backup on every dirty tick; the elected leader also writes
/// the shared external store (spec §4.4 "Leader election for external
/// persistence"). All clients write local regardless of leadership.
async fn auto_save_loop(session: Arc<ClientSession>) {
	let mut ticker = tokio::time::interval(Duration::from_secs(AUTO_SAVE_INTERVAL_SECS));
	loop {
		ticker.tick().await;
		if !session.dirty.swap(false, Ordering::Relaxed) {
			continue;
		}
		let snapshot = session.doc.encode_state_as_update();
		if let Err(err) = session.local.save(&session.config.notebook_id, &snapshot).await {
			warn!(notebook_id = %session.config.notebook_id, %err, "failed to write local backup");
		}
		if session.is_leader().await {
			if let Err(err) = session.external.save(&session.config.notebook_id, &snapshot).await {
				warn!(notebook_id = %session.config.notebook_id, %err, "failed to write external snapshot");
			}
		}
	}
}

/// Fold one inbound frame from the gateway into the session's document or
/// awareness registry. Exposed standalone (not spawned internally) so tests
/// can drive it without a real socket.
pub async fn apply_inbound_frame(session: &ClientSession, frame: Frame) {
	const REMOTE_ORIGIN: u64 = 1;
	match frame {
		Frame::SyncStep1(remote_sv) => {
			if let Ok(sv) = notebook_crdt::protocol::decode_state_vector(&remote_sv) {
				let diff = session.doc.encode_diff(&sv);
				if let Some(ws) = &session.ws {
					ws.send(notebook_crdt::protocol::encode_sync_step2(&diff));
				}
			}
		}
		Frame::SyncStep2(update) | Frame::Update(update) => {
			if session.doc.apply_update_with_origin(&update, REMOTE_ORIGIN).is_ok() {
				session.mark_dirty();
				session.set_collab_status(CollabStatus::Connected).await;
			}
		}
		Frame::Awareness(payload) => {
			if let Ok(state) = serde_json::from_slice::<AwarenessState>(&payload) {
				session.awareness.lock().await.apply(state);
			}
		}
		// Reserved, always ignored (spec §4.1).
		Frame::Auth(_) => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;

	struct NullStore;

	#[async_trait]
	impl LocalStore for NullStore {
		async fn load(&self, _notebook_id: &NotebookId) -> Result<Option<Vec<u8>>> {
			Ok(None)
		}
		async fn save(&self, _notebook_id: &NotebookId, _snapshot: &[u8]) -> Result<()> {
			Ok(())
		}
	}

	#[async_trait]
	impl ExternalStore for NullStore {
		async fn load(&self, _notebook_id: &NotebookId) -> Result<Option<Vec<u8>>> {
			Ok(None)
		}
		async fn save(&self, _notebook_id: &NotebookId, _snapshot: &[u8]) -> Result<()> {
			Ok(())
		}
	}

	fn local_only_config() -> ClientConfig {
		ClientConfig {
			notebook_id: NotebookId::new("nb-test"),
			collab_server_url: None,
			auth_token: "unused".into(),
			collab_connect_timeout_ms: 2000,
			backend_kernel_url: None,
			kernel_mode: crate::config::KernelMode::Backend,
		}
	}

	#[tokio::test]
	async fn local_only_session_seeds_default_and_reports_disabled_collab() {
		let session = ClientSession::start(local_only_config(), Arc::new(NullStore), Arc::new(NullStore))
			.await
			.expect("starts");
		assert_eq!(session.collab_status().await, CollabStatus::Disabled);
		assert_eq!(session.doc.cell_count(), 2);
		assert_eq!(session.peer_count().await, 1);
		assert!(session.is_leader().await);
	}

	#[tokio::test]
	async fn connected_status_never_downgrades_except_explicitly_reset() {
		let session = ClientSession::start(local_only_config(), Arc::new(NullStore), Arc::new(NullStore))
			.await
			.expect("starts");
		session.set_collab_status(CollabStatus::Connected).await;
		session.set_collab_status(CollabStatus::Fallback).await;
		assert_eq!(session.collab_status().await, CollabStatus::Connected);
	}

	#[tokio::test]
	async fn sync_view_seeds_idle_runtime_for_every_seeded_cell() {
		let session = ClientSession::start(local_only_config(), Arc::new(NullStore), Arc::new(NullStore))
			.await
			.expect("starts");
		let view = session.sync_view().await;
		assert_eq!(view.len(), 2);
		assert!(view.iter().all(|c| c.runtime.status == Some(crate::runtime::CellRunStatus::Idle)));
		assert_eq!(session.active_cell_id().await, Some(view[0].id.clone()));
	}

	#[tokio::test]
	async fn insert_then_delete_cell_round_trips_through_runtime() {
		let session = ClientSession::start(local_only_config(), Arc::new(NullStore), Arc::new(NullStore))
			.await
			.expect("starts");
		let first_id = session.doc.cells_view()[0].id.clone();

		let new_id = session.insert_cell(Some(&first_id), CellType::Markdown).await;
		assert_eq!(session.doc.cell_count(), 3);

		session.delete_cell(&new_id).await.expect("deletes");
		assert_eq!(session.doc.cell_count(), 2);
	}

	#[tokio::test]
	async fn delete_cell_refuses_below_one_and_leaves_count_unchanged() {
		let session = ClientSession::start(local_only_config(), Arc::new(NullStore), Arc::new(NullStore))
			.await
			.expect("starts");
		let ids: Vec<String> = session.doc.cells_view().into_iter().map(|c| c.id).collect();
		session.delete_cell(&ids[0]).await.expect("first delete succeeds");
		assert!(session.delete_cell(&ids[1]).await.is_err());
		assert_eq!(session.doc.cell_count(), 1);
	}

	#[tokio::test]
	async fn execute_cell_without_kernel_configured_errors() {
		let session = ClientSession::start(local_only_config(), Arc::new(NullStore), Arc::new(NullStore))
			.await
			.expect("starts");
		let id = session.doc.cells_view()[0].id.clone();
		assert!(session.execute_cell(&id, false).await.is_err());
	}
}

// vim: ts=4
