//! Basic snapshot store operation tests.

use notebook_snapshot_redb::{InMemorySnapshotStore, MAX_SNAPSHOT_BYTES, RedbSnapshotStore, SnapshotStore};
use notebook_types::NotebookId;
use tempfile::TempDir;

async fn create_test_store() -> (RedbSnapshotStore, TempDir) {
	let temp_dir = TempDir::new().expect("failed to create temp directory");
	let db_path = temp_dir.path().join("notebooks.redb");
	let store = RedbSnapshotStore::open(&db_path).await.expect("failed to open store");
	(store, temp_dir)
}

#[tokio::test]
async fn missing_notebook_loads_as_none() {
	let (store, _temp) = create_test_store().await;
	let id = NotebookId::new("nb-missing");
	assert!(store.load(&id).await.expect("load ok").is_none());
}

#[tokio::test]
async fn save_then_load_round_trips() {
	let (store, _temp) = create_test_store().await;
	let id = NotebookId::new("nb-1");
	let snapshot = vec![1u8, 2, 3, 4, 5];

	store.save(&id, &snapshot).await.expect("save ok");
	let loaded = store.load(&id).await.expect("load ok");
	assert_eq!(loaded, Some(snapshot));
}

#[tokio::test]
async fn save_overwrites_previous_snapshot() {
	let (store, _temp) = create_test_store().await;
	let id = NotebookId::new("nb-2");

	store.save(&id, &[1, 2, 3]).await.expect("save ok");
	store.save(&id, &[9, 9]).await.expect("save ok");

	let loaded = store.load(&id).await.expect("load ok");
	assert_eq!(loaded, Some(vec![9, 9]));
}

#[tokio::test]
async fn delete_removes_snapshot() {
	let (store, _temp) = create_test_store().await;
	let id = NotebookId::new("nb-3");
	store.save(&id, &[1]).await.expect("save ok");
	store.delete(&id).await.expect("delete ok");
	assert!(store.load(&id).await.expect("load ok").is_none());
}

#[tokio::test]
async fn oversized_snapshot_is_rejected() {
	let (store, _temp) = create_test_store().await;
	let id = NotebookId::new("nb-huge");
	let oversized = vec![0u8; MAX_SNAPSHOT_BYTES + 1];
	let err = store.save(&id, &oversized).await.expect_err("should reject");
	assert!(matches!(err, notebook_types::Error::SnapshotTooLarge { .. }));
}

#[tokio::test]
async fn notebooks_are_isolated_by_id() {
	let (store, _temp) = create_test_store().await;
	let a = NotebookId::new("nb-a");
	let b = NotebookId::new("nb-b");

	store.save(&a, &[1]).await.expect("save ok");
	store.save(&b, &[2]).await.expect("save ok");

	assert_eq!(store.load(&a).await.expect("load ok"), Some(vec![1]));
	assert_eq!(store.load(&b).await.expect("load ok"), Some(vec![2]));
}

#[tokio::test]
async fn in_memory_store_matches_redb_behavior() {
	let store = InMemorySnapshotStore::new();
	let id = NotebookId::new("nb-mem");
	assert!(store.load(&id).await.expect("load ok").is_none());
	store.save(&id, &[7, 7, 7]).await.expect("save ok");
	assert_eq!(store.load(&id).await.expect("load ok"), Some(vec![7, 7, 7]));
}
