use memagent_state::storage_traits::*;
use memagent_state::{StateHandle, StorageError};

#[tokio::test]
async fn surrealkv_state_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("surrealkv://{}", dir.path().join("db").display());

    let record = MemoryRecord::new("likes green tea", Scope::user("alice"), vec![0.3, 0.7]);
    let id = record.id.clone();

    {
        let handle = StateHandle::setup_url(&url).await.unwrap();
        handle.record_store().insert(record).await.unwrap();
        handle.metadata_store().set_importance(&id, 0.8).await.unwrap();
        handle
            .history_log()
            .append(&id, HistoryAction::Add, "likes green tea")
            .await
            .unwrap();
    }
    // Let the embedded router shut down and release the datastore.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let handle = StateHandle::setup_url(&url).await.unwrap();
    let fetched = handle.record_store().get(&id).await.unwrap().unwrap();
    assert_eq!(fetched.content, "likes green tea");
    assert_eq!(fetched.embedding, vec![0.3, 0.7]);

    let meta = handle.metadata_store().get(&id).await.unwrap().unwrap();
    assert_eq!(meta.importance, 0.8);

    let history = handle.history_log().history(&id).await.unwrap();
    assert_eq!(history.len(), 1);

    // The next append continues the persisted sequence.
    let next = handle
        .history_log()
        .append(&id, HistoryAction::Delete, "")
        .await
        .unwrap();
    assert_eq!(next.seq, 2);
}

#[tokio::test]
async fn schema_init_is_idempotent_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("surrealkv://{}", dir.path().join("db").display());

    drop(StateHandle::setup_url(&url).await.unwrap());
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let handle = StateHandle::setup_url(&url).await.unwrap();
    assert!(handle
        .record_store()
        .list(&Scope::all())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn delete_with_existing_tombstone_still_removes_record() {
    let handle = StateHandle::setup_db().await.unwrap();
    let store = handle.record_store();
    let record = MemoryRecord::new("owns a kayak", Scope::all(), vec![1.0, 0.0]);
    let id = record.id.clone();
    store.insert(record.clone()).await.unwrap();

    // A tombstone left behind by an earlier interrupted delete.
    handle
        .db()
        .query("CREATE memory_tombstones CONTENT { memory_id: $mid, retired_at: time::now() }")
        .bind(("mid", id.as_str().to_string()))
        .await
        .unwrap()
        .check()
        .unwrap();

    assert!(store.delete(&id).await.unwrap());
    assert!(store.get(&id).await.unwrap().is_none());
    assert!(!store.delete(&id).await.unwrap());

    // The id stays retired.
    let err = store.insert(record).await.unwrap_err();
    assert!(matches!(err, StorageError::IdConflict { .. }));
}

#[tokio::test]
async fn clear_with_existing_tombstone_still_empties_store() {
    let handle = StateHandle::setup_db().await.unwrap();
    let store = handle.record_store();
    let record = MemoryRecord::new("owns a canoe", Scope::all(), vec![0.0, 1.0]);
    let id = record.id.clone();
    store.insert(record).await.unwrap();

    handle
        .db()
        .query("CREATE memory_tombstones CONTENT { memory_id: $mid, retired_at: time::now() }")
        .bind(("mid", id.as_str().to_string()))
        .await
        .unwrap()
        .check()
        .unwrap();

    store.clear().await.unwrap();
    assert!(store.list(&Scope::all()).await.unwrap().is_empty());
}
