//! Redb-backed snapshot persistence.
//!
//! Each notebook's latest encoded CRDT state (a `yrs` state-as-update blob)
//! is stored under its notebook id in a single redb table. There is no
//! update log and no per-tenant sharding here — unlike the append-only,
//! multi-tenant design this is adapted from, a coordinator only ever needs
//! "the last thing I wrote", because `yrs::Doc::encode_state_as_update`
//! already captures the full merged state.
//!
//! # Storage layout
//!
//! One redb table, `notebook_snapshots`: `notebook_id -> snapshot_bytes`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use notebook_types::prelude::*;
use redb::{ReadableDatabase, ReadableTable};
use tokio::sync::RwLock;

mod error;
pub use error::Error;

/// Snapshots larger than this are rejected rather than persisted (Open
/// Question resolution: a notebook that grows unbounded should fail loudly,
/// not silently balloon the database).
pub const MAX_SNAPSHOT_BYTES: usize = 2 * 1024 * 1024;

mod tables {
	use redb::TableDefinition;

	pub const TABLE_SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("notebook_snapshots");
}

use tables::TABLE_SNAPSHOTS;

fn storage_err(err: impl std::fmt::Display) -> notebook_types::Error {
	Error::Db(err.to_string()).into()
}

fn check_size(snapshot: &[u8]) -> Result<()> {
	if snapshot.len() > MAX_SNAPSHOT_BYTES {
		return Err(notebook_types::Error::SnapshotTooLarge { size: snapshot.len(), limit: MAX_SNAPSHOT_BYTES });
	}
	Ok(())
}

/// Persistence surface a coordinator needs: load the last snapshot on
/// cold start, save a new one after a coalesced edit burst.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
	async fn load(&self, notebook_id: &NotebookId) -> Result<Option<Vec<u8>>>;
	async fn save(&self, notebook_id: &NotebookId, snapshot: &[u8]) -> Result<()>;
	async fn delete(&self, notebook_id: &NotebookId) -> Result<()>;
}

/// `SnapshotStore` backed by a single redb file on disk.
pub struct RedbSnapshotStore {
	db: Arc<RwLock<redb::Database>>,
}

impl RedbSnapshotStore {
	pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path: PathBuf = path.as_ref().to_path_buf();
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		let db = redb::Database::create(&path).map_err(storage_err)?;

		let tx = db.begin_write().map_err(storage_err)?;
		{
			let _ = tx.open_table(TABLE_SNAPSHOTS).map_err(storage_err)?;
		}
		tx.commit().map_err(storage_err)?;

		Ok(Self { db: Arc::new(RwLock::new(db)) })
	}
}

#[async_trait]
impl SnapshotStore for RedbSnapshotStore {
	async fn load(&self, notebook_id: &NotebookId) -> Result<Option<Vec<u8>>> {
		let db = self.db.read().await;
		let tx = db.begin_read().map_err(storage_err)?;
		let table = tx.open_table(TABLE_SNAPSHOTS).map_err(storage_err)?;
		let value = table.get(notebook_id.as_str()).map_err(storage_err)?.map(|v| v.value().to_vec());
		Ok(value)
	}

	async fn save(&self, notebook_id: &NotebookId, snapshot: &[u8]) -> Result<()> {
		check_size(snapshot)?;
		let db = self.db.write().await;
		let tx = db.begin_write().map_err(storage_err)?;
		{
			let mut table = tx.open_table(TABLE_SNAPSHOTS).map_err(storage_err)?;
			table.insert(notebook_id.as_str(), snapshot).map_err(storage_err)?;
		}
		tx.commit().map_err(storage_err)?;
		tracing::trace!(notebook_id = %notebook_id, bytes = snapshot.len(), "persisted snapshot");
		Ok(())
	}

	async fn delete(&self, notebook_id: &NotebookId) -> Result<()> {
		let db = self.db.write().await;
		let tx = db.begin_write().map_err(storage_err)?;
		{
			let mut table = tx.open_table(TABLE_SNAPSHOTS).map_err(storage_err)?;
			table.remove(notebook_id.as_str()).map_err(storage_err)?;
		}
		tx.commit().map_err(storage_err)?;
		Ok(())
	}
}

/// In-memory `SnapshotStore`, used by coordinator unit tests so they don't
/// need a temp file per test.
#[derive(Default)]
pub struct InMemorySnapshotStore {
	entries: dashmap::DashMap<String, Vec<u8>>,
}

impl InMemorySnapshotStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
	async fn load(&self, notebook_id: &NotebookId) -> Result<Option<Vec<u8>>> {
		Ok(self.entries.get(notebook_id.as_str()).map(|v| v.clone()))
	}

	async fn save(&self, notebook_id: &NotebookId, snapshot: &[u8]) -> Result<()> {
		check_size(snapshot)?;
		self.entries.insert(notebook_id.as_str().to_string(), snapshot.to_vec());
		Ok(())
	}

	async fn delete(&self, notebook_id: &NotebookId) -> Result<()> {
		self.entries.remove(notebook_id.as_str());
		Ok(())
	}
}

// vim: ts=4
