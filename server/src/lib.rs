//! Gateway (C3) and per-notebook coordinator (C2) for the notebook
//! synchronization engine.
//!
//! Mirrors the teacher's `AppBuilder`/`AppState` wiring shape, stripped to
//! what this gateway actually needs: no scheduler, worker pool, ACME or
//! settings registry — just a coordinator directory and a snapshot store
//! behind a config struct built once at startup.

pub mod config;
pub mod coordinator;
pub mod extract;
pub mod prelude;
pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notebook_snapshot_redb::{RedbSnapshotStore, SnapshotStore};
use notebook_types::prelude::*;

pub use config::Config;
pub use coordinator::{CoordinatorRegistry, NotebookCoordinator};

/// Shared application state, cloned cheaply into every axum handler (all
/// fields are `Arc`/`Box<str>`/`Copy` underneath).
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub registry: Arc<CoordinatorRegistry>,
}

impl AppState {
	/// Build application state: open the snapshot store and wire it into a
	/// fresh, empty coordinator registry. Coordinators themselves are
	/// created lazily on first access (spec §9).
	pub async fn new(config: Config) -> Result<Self> {
		let db_path: PathBuf = [config.data_dir.as_ref(), "notebooks.redb"].iter().collect();
		let snapshot_store: Arc<dyn SnapshotStore> = Arc::new(RedbSnapshotStore::open(&db_path).await?);
		let persist_coalesce = Duration::from_millis(config.persist_coalesce_ms);
		let registry = Arc::new(CoordinatorRegistry::new(snapshot_store, persist_coalesce));

		Ok(AppState { config: Arc::new(config), registry })
	}
}

// vim: ts=4
