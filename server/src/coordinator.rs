//! Per-notebook coordinator (C2).
//!
//! One `NotebookCoordinator` owns the authoritative `yrs::Doc` for a single
//! notebook, the set of connected sockets, and the ephemeral awareness
//! registry. It never touches HTTP routing — that's the gateway's job.
//!
//! Grounded on the connection-lifecycle shape of the teacher's
//! `crdt/websocket.rs` (split socket into send/receive halves, a
//! `tokio::sync::broadcast` channel fanning updates out to every other
//! socket, cleanup when the last receiver drops) generalized from that
//! file's 1-byte message tag to the varint-based `notebook_crdt::protocol`
//! framing and from a single global `HashMap` to one coordinator instance
//! per notebook.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use notebook_crdt::{AwarenessDelta, AwarenessRegistry, AwarenessState, Frame, NotebookDoc, sanitize};
use notebook_types::prelude::*;
use notebook_snapshot_redb::SnapshotStore;
use tokio::sync::{Mutex, Notify, mpsc};

/// Transaction origin tag for updates applied on behalf of a remote socket,
/// distinct from `notebook_crdt::sanitize::SANITIZE_ORIGIN` (0) so a future
/// reader can tell "came from the network" apart from "self-repair".
const REMOTE_ORIGIN: u64 = 1;

/// Cadence of the background awareness-eviction sweep (spec §4.3's staleness
/// threshold is 60s; sweeping well under that catches a dead client quickly
/// without adding much lock contention).
const MAINTENANCE_INTERVAL_SECS: u64 = 20;

/// Outbound frame queued for delivery to one socket's writer task.
pub type OutboundTx = mpsc::UnboundedSender<Vec<u8>>;

pub struct NotebookCoordinator {
	notebook_id: NotebookId,
	doc: NotebookDoc,
	awareness: Mutex<AwarenessRegistry>,
	sockets: DashMap<u64, OutboundTx>,
	next_socket_id: AtomicU64,
	dirty: AtomicBool,
	persist_notify: Notify,
	snapshot_store: Arc<dyn SnapshotStore>,
}

impl NotebookCoordinator {
	/// Hydrate from the snapshot store, seeding a fresh default notebook if
	/// none exists yet (spec §4.2 bootstrap sequence, steps 1/3).
	async fn load_or_seed(notebook_id: NotebookId, snapshot_store: Arc<dyn SnapshotStore>) -> Result<Self> {
		let doc = match snapshot_store.load(&notebook_id).await? {
			Some(bytes) => {
				info!(notebook_id = %notebook_id, bytes = bytes.len(), "hydrating notebook from snapshot");
				NotebookDoc::from_update(&bytes)?
			}
			None => {
				info!(notebook_id = %notebook_id, "no snapshot found, seeding default notebook");
				let doc = NotebookDoc::new();
				doc.seed_default();
				doc
			}
		};

		let report = sanitize(&doc);
		if !report.is_clean() {
			warn!(notebook_id = %notebook_id, ?report, "sanitize repaired invariant violations on hydrate");
		}

		Ok(NotebookCoordinator {
			notebook_id,
			doc,
			awareness: Mutex::new(AwarenessRegistry::new()),
			sockets: DashMap::new(),
			next_socket_id: AtomicU64::new(1),
			dirty: AtomicBool::new(false),
			persist_notify: Notify::new(),
			snapshot_store,
		})
	}

	/// Spawn a coordinator's background persistence loop (spec §4.2: writes
	/// are coalesced to at most one per `coalesce` interval).
	pub async fn spawn(
		notebook_id: NotebookId,
		snapshot_store: Arc<dyn SnapshotStore>,
		coalesce: Duration,
	) -> Result<Arc<Self>> {
		let coordinator = Arc::new(Self::load_or_seed(notebook_id, snapshot_store).await?);
		tokio::spawn(persistence_loop(coordinator.clone(), coalesce));
		tokio::spawn(maintenance_loop(coordinator.clone()));
		Ok(coordinator)
	}

	pub fn notebook_id(&self) -> &NotebookId {
		&self.notebook_id
	}

	/// Full current document state, for the HTTP snapshot bootstrap fallback
	/// (spec §4.4 step 2).
	pub fn snapshot(&self) -> Vec<u8> {
		self.doc.encode_state_as_update()
	}

	/// Register a newly-connected socket and hand back its id, the
	/// `SyncStep1` frame it should send first, and one `Awareness` frame per
	/// currently-known peer to send right after (spec §4.2 "Connection
	/// acceptance": re-sanitize on upgrade, then sync step 1, then — if the
	/// awareness registry is non-empty — every current state).
	pub async fn register_socket(&self, tx: OutboundTx) -> (u64, Vec<u8>, Vec<Vec<u8>>) {
		let report = sanitize(&self.doc);
		if !report.is_clean() {
			warn!(notebook_id = %self.notebook_id, ?report, "sanitize repaired invariant violations on socket upgrade");
			self.dirty.store(true, Ordering::Relaxed);
			self.persist_notify.notify_one();
		}

		let socket_id = self.next_socket_id.fetch_add(1, Ordering::Relaxed);
		self.sockets.insert(socket_id, tx);
		let step1 = notebook_crdt::protocol::encode_sync_step1(&self.doc.state_vector());

		let awareness_frames = {
			let registry = self.awareness.lock().await;
			registry
				.states()
				.filter_map(|state| serde_json::to_vec(state).ok())
				.map(|payload| notebook_crdt::protocol::encode_awareness(&payload))
				.collect()
		};

		(socket_id, step1, awareness_frames)
	}

	/// Drop a socket's registration and any awareness entry it owned,
	/// broadcasting the departure to the rest of the room.
	pub async fn unregister_socket(&self, socket_id: u64, client_id: Option<&str>) {
		self.sockets.remove(&socket_id);
		if let Some(client_id) = client_id {
			let removed = self.awareness.lock().await.remove(client_id);
			if removed {
				self.broadcast_awareness_removed(client_id, socket_id);
			}
		}
	}

	/// Handle one inbound frame from `socket_id`. Returns the client id this
	/// socket has claimed via awareness, if any (so the caller can remember
	/// it for `unregister_socket`).
	pub async fn handle_frame(&self, socket_id: u64, frame: Frame, known_client_id: Option<String>) -> Option<String> {
		match frame {
			Frame::SyncStep1(remote_sv_bytes) => {
				let Ok(remote_sv) = notebook_crdt::protocol::decode_state_vector(&remote_sv_bytes) else {
					warn!(%socket_id, "dropping malformed sync step1 payload");
					return known_client_id;
				};
				let diff = self.doc.encode_diff(&remote_sv);
				self.send_to(socket_id, notebook_crdt::protocol::encode_sync_step2(&diff));
				known_client_id
			}
			Frame::SyncStep2(update) | Frame::Update(update) => {
				if let Err(err) = self.doc.apply_update_with_origin(&update, REMOTE_ORIGIN) {
					warn!(%socket_id, %err, "dropping malformed update frame");
					return known_client_id;
				}
				self.dirty.store(true, Ordering::Relaxed);
				self.persist_notify.notify_one();
				self.broadcast_except(socket_id, notebook_crdt::protocol::encode_update(&update));
				known_client_id
			}
			Frame::Awareness(payload) => self.handle_awareness(socket_id, &payload, known_client_id).await,
			// Reserved, always ignored (spec §4.1): auth is the gateway's job.
			Frame::Auth(_) => known_client_id,
		}
	}

	async fn handle_awareness(&self, socket_id: u64, payload: &[u8], known_client_id: Option<String>) -> Option<String> {
		let incoming: AwarenessState = match serde_json::from_slice(payload) {
			Ok(state) => state,
			Err(err) => {
				warn!(%socket_id, %err, "dropping malformed awareness payload");
				return known_client_id;
			}
		};
		let client_id = incoming.client_id.clone();
		let delta = self.awareness.lock().await.apply(incoming);
		if matches!(delta, AwarenessDelta::Removed) {
			self.broadcast_awareness_removed(&client_id, socket_id);
			return None;
		}
		self.broadcast_except(socket_id, notebook_crdt::protocol::encode_awareness(payload));
		Some(client_id)
	}

	fn broadcast_awareness_removed(&self, client_id: &str, from_socket: u64) {
		let payload = serde_json::json!({ "clientId": client_id, "state": null });
		let Ok(bytes) = serde_json::to_vec(&payload) else { return };
		self.broadcast_except(from_socket, notebook_crdt::protocol::encode_awareness(&bytes));
	}

	/// Evict stale awareness entries (spec §4.3); call periodically from the
	/// gateway's own maintenance tick.
	pub async fn evict_stale_awareness(&self) {
		let evicted = self.awareness.lock().await.evict_stale(Timestamp::now());
		for client_id in evicted {
			self.broadcast_awareness_removed(&client_id, u64::MAX);
		}
	}

	fn send_to(&self, socket_id: u64, bytes: Vec<u8>) {
		if let Some(tx) = self.sockets.get(&socket_id) {
			let _ = tx.send(bytes);
		}
	}

	fn broadcast_except(&self, origin_socket: u64, bytes: Vec<u8>) {
		for entry in self.sockets.iter() {
			if *entry.key() != origin_socket {
				let _ = entry.value().send(bytes.clone());
			}
		}
	}

	async fn persist_if_dirty(&self) {
		if self.dirty.swap(false, Ordering::Relaxed) {
			let snapshot = self.doc.encode_state_as_update();
			match self.snapshot_store.save(&self.notebook_id, &snapshot).await {
				Ok(()) => debug!(notebook_id = %self.notebook_id, bytes = snapshot.len(), "persisted snapshot"),
				Err(err) => error!(notebook_id = %self.notebook_id, %err, "failed to persist snapshot"),
			}
		}
	}
}

async fn persistence_loop(coordinator: Arc<NotebookCoordinator>, coalesce: Duration) {
	loop {
		coordinator.persist_notify.notified().await;
		tokio::time::sleep(coalesce).await;
		coordinator.persist_if_dirty().await;
	}
}

/// Periodic sweep evicting clients that went silent without a clean
/// disconnect (spec §4.3: "periodic maintenance tick").
async fn maintenance_loop(coordinator: Arc<NotebookCoordinator>) {
	let mut ticker = tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
	loop {
		ticker.tick().await;
		coordinator.evict_stale_awareness().await;
	}
}

/// Process-wide `notebookId -> coordinator` directory (spec §9's routing
/// guarantee), with cold-start de-duplication so two concurrent first
/// connections to the same notebook don't race to hydrate it twice.
pub struct CoordinatorRegistry {
	entries: DashMap<NotebookId, Arc<tokio::sync::OnceCell<Arc<NotebookCoordinator>>>>,
	snapshot_store: Arc<dyn SnapshotStore>,
	persist_coalesce: Duration,
}

impl CoordinatorRegistry {
	pub fn new(snapshot_store: Arc<dyn SnapshotStore>, persist_coalesce: Duration) -> Self {
		CoordinatorRegistry { entries: DashMap::new(), snapshot_store, persist_coalesce }
	}

	pub async fn get_or_create(&self, notebook_id: &NotebookId) -> Result<Arc<NotebookCoordinator>> {
		let cell = self
			.entries
			.entry(notebook_id.clone())
			.or_insert_with(|| Arc::new(tokio::sync::OnceCell::new()))
			.clone();

		let coordinator = cell
			.get_or_try_init(|| {
				NotebookCoordinator::spawn(notebook_id.clone(), self.snapshot_store.clone(), self.persist_coalesce)
			})
			.await?;
		Ok(coordinator.clone())
	}

	pub fn active_notebook_count(&self) -> usize {
		self.entries.len()
	}
}


// vim: ts=4
