//! Trait contract tests for RecordStore, MetadataStore, and HistoryLog.
//!
//! Each contract is written once against the trait object and run against
//! both the in-memory stores and the SurrealDB stores (`mem://`).

use std::sync::Arc;

use futures::future::join_all;
use memagent_state::storage_traits::*;
use memagent_state::{
    InMemoryHistoryLog, InMemoryMetadataStore, InMemoryRecordStore, StateHandle, StorageError,
};

// ===========================================================================
// RecordStore contracts
// ===========================================================================

fn unit(x: f32, y: f32) -> Vec<f32> {
    vec![x, y]
}

async fn record_insert_then_get(store: &dyn RecordStore) {
    let record = MemoryRecord::new("cat is a pet", Scope::user("u1"), unit(1.0, 0.0));
    let id = record.id.clone();
    store.insert(record).await.unwrap();

    let fetched = store.get(&id).await.unwrap().unwrap();
    assert_eq!(fetched.content, "cat is a pet");
    assert_eq!(fetched.scope, Scope::user("u1"));
    assert_eq!(fetched.embedding, unit(1.0, 0.0));
}

async fn record_get_missing_is_none(store: &dyn RecordStore) {
    assert!(store.get(&MemoryId::from("nope")).await.unwrap().is_none());
}

async fn record_duplicate_insert_conflicts(store: &dyn RecordStore) {
    let record = MemoryRecord::new("a", Scope::all(), unit(1.0, 0.0));
    store.insert(record.clone()).await.unwrap();

    let err = store.insert(record).await.unwrap_err();
    assert!(matches!(err, StorageError::IdConflict { .. }));
}

async fn record_deleted_id_is_never_reused(store: &dyn RecordStore) {
    let record = MemoryRecord::new("a", Scope::all(), unit(1.0, 0.0));
    let id = record.id.clone();
    store.insert(record.clone()).await.unwrap();
    assert!(store.delete(&id).await.unwrap());

    let err = store.insert(record).await.unwrap_err();
    assert!(matches!(err, StorageError::IdConflict { .. }));
    assert!(store.get(&id).await.unwrap().is_none());
}

async fn record_delete_missing_returns_false(store: &dyn RecordStore) {
    assert!(!store.delete(&MemoryId::from("ghost")).await.unwrap());
}

async fn record_replace_content_keeps_id(store: &dyn RecordStore) {
    let record = MemoryRecord::new("cat is a pet", Scope::user("u1"), unit(1.0, 0.0));
    let id = record.id.clone();
    let created_at = record.created_at;
    store.insert(record).await.unwrap();

    let updated = store
        .replace_content(&id, "cat is a dog", unit(0.0, 1.0))
        .await
        .unwrap();
    assert_eq!(updated.id, id);
    assert_eq!(updated.content, "cat is a dog");
    assert!(updated.updated_at >= created_at);

    let fetched = store.get(&id).await.unwrap().unwrap();
    assert_eq!(fetched.content, "cat is a dog");
    assert_eq!(fetched.embedding, unit(0.0, 1.0));
    assert_eq!(fetched.scope, Scope::user("u1"));
}

async fn record_replace_missing_is_not_found(store: &dyn RecordStore) {
    let err = store
        .replace_content(&MemoryId::from("ghost"), "x", unit(1.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

async fn record_list_respects_scope(store: &dyn RecordStore) {
    store
        .insert(MemoryRecord::new("u1 fact", Scope::user("u1"), unit(1.0, 0.0)))
        .await
        .unwrap();
    store
        .insert(MemoryRecord::new(
            "u1 run fact",
            Scope::user("u1").with_run("r1"),
            unit(1.0, 0.0),
        ))
        .await
        .unwrap();
    store
        .insert(MemoryRecord::new("u2 fact", Scope::user("u2"), unit(1.0, 0.0)))
        .await
        .unwrap();

    assert_eq!(store.list(&Scope::all()).await.unwrap().len(), 3);
    assert_eq!(store.list(&Scope::user("u1")).await.unwrap().len(), 2);

    let run_only = store.list(&Scope::default().with_run("r1")).await.unwrap();
    assert_eq!(run_only.len(), 1);
    assert_eq!(run_only[0].content, "u1 run fact");

    assert!(store.list(&Scope::user("u3")).await.unwrap().is_empty());
}

async fn record_search_filters_and_orders(store: &dyn RecordStore) {
    let near = MemoryRecord::new("near", Scope::user("u1"), unit(1.0, 0.1));
    let mid = MemoryRecord::new("mid", Scope::user("u1"), unit(1.0, 1.0));
    let far = MemoryRecord::new("far", Scope::user("u1"), unit(-1.0, 0.0));
    let other = MemoryRecord::new("other user", Scope::user("u2"), unit(1.0, 0.0));
    for record in [far, mid, near, other] {
        store.insert(record).await.unwrap();
    }

    let hits = store
        .search(&unit(1.0, 0.0), &Scope::user("u1"), 10, 0.8)
        .await
        .unwrap();
    let contents: Vec<&str> = hits.iter().map(|h| h.record.content.as_str()).collect();
    assert_eq!(contents, vec!["near", "mid"]);
    assert!(hits[0].distance <= hits[1].distance);
    assert!(hits.iter().all(|h| h.distance < 0.8));

    let limited = store
        .search(&unit(1.0, 0.0), &Scope::user("u1"), 1, 0.8)
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].record.content, "near");
}

async fn record_search_threshold_is_strict(store: &dyn RecordStore) {
    // Orthogonal vectors sit at distance exactly 1.0.
    store
        .insert(MemoryRecord::new("orthogonal", Scope::all(), unit(0.0, 1.0)))
        .await
        .unwrap();

    let hits = store
        .search(&unit(1.0, 0.0), &Scope::all(), 10, 1.0)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

async fn record_clear_retires_everything(store: &dyn RecordStore) {
    let record = MemoryRecord::new("a", Scope::all(), unit(1.0, 0.0));
    store.insert(record.clone()).await.unwrap();
    store.clear().await.unwrap();

    assert!(store.list(&Scope::all()).await.unwrap().is_empty());
    let err = store.insert(record).await.unwrap_err();
    assert!(matches!(err, StorageError::IdConflict { .. }));
}

// ===========================================================================
// MetadataStore contracts
// ===========================================================================

async fn metadata_set_importance_creates_entry(store: &dyn MetadataStore) {
    let id = MemoryId::from("m1");
    let entry = store.set_importance(&id, 0.9).await.unwrap();
    assert_eq!(entry.importance, 0.9);
    assert_eq!(entry.access_count, 1);

    let fetched = store.get(&id).await.unwrap().unwrap();
    assert_eq!(fetched.importance, 0.9);
    assert_eq!(fetched.access_count, 1);
}

async fn metadata_set_importance_keeps_access_data(store: &dyn MetadataStore) {
    let id = MemoryId::from("m1");
    store.set_importance(&id, 0.2).await.unwrap();
    store.bump_access(&id).await.unwrap();
    let entry = store.set_importance(&id, 0.7).await.unwrap();

    assert_eq!(entry.importance, 0.7);
    assert_eq!(entry.access_count, 2);
}

async fn metadata_bump_increments_and_never_rewinds(store: &dyn MetadataStore) {
    let id = MemoryId::from("m1");
    let first = store.set_importance(&id, 0.5).await.unwrap();
    let bumped = store.bump_access(&id).await.unwrap();

    assert_eq!(bumped.access_count, 2);
    assert_eq!(bumped.importance, 0.5);
    assert!(bumped.last_accessed_at >= first.last_accessed_at);
}

async fn metadata_bump_missing_creates_entry(store: &dyn MetadataStore) {
    let entry = store.bump_access(&MemoryId::from("fresh")).await.unwrap();
    assert_eq!(entry.access_count, 1);
    assert_eq!(entry.importance, 0.0);
}

async fn metadata_concurrent_bumps_are_not_lost(store: Arc<dyn MetadataStore>) {
    let id = MemoryId::from("hot");
    store.set_importance(&id, 0.5).await.unwrap();

    let bumps = (0..64).map(|_| {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move { store.bump_access(&id).await })
    });
    for joined in join_all(bumps).await {
        joined.unwrap().unwrap();
    }

    let entry = store.get(&id).await.unwrap().unwrap();
    assert_eq!(entry.access_count, 65);
    assert_eq!(entry.importance, 0.5);
}

async fn metadata_delete_and_list(store: &dyn MetadataStore) {
    store.set_importance(&MemoryId::from("b"), 0.1).await.unwrap();
    store.set_importance(&MemoryId::from("a"), 0.2).await.unwrap();

    let ids: Vec<String> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.memory_id.0)
        .collect();
    assert_eq!(ids, vec!["a", "b"]);

    assert!(store.delete(&MemoryId::from("a")).await.unwrap());
    assert!(!store.delete(&MemoryId::from("a")).await.unwrap());
    assert!(store.get(&MemoryId::from("a")).await.unwrap().is_none());

    store.clear().await.unwrap();
    assert!(store.list().await.unwrap().is_empty());
}

// ===========================================================================
// HistoryLog contracts
// ===========================================================================

async fn history_append_order_and_seq(log: &dyn HistoryLog) {
    let id = MemoryId::from("m1");
    log.append(&id, HistoryAction::Add, "cat is a pet").await.unwrap();
    log.append(&id, HistoryAction::Update, "cat is a dog").await.unwrap();
    log.append(&id, HistoryAction::Delete, "").await.unwrap();

    let entries = log.history(&id).await.unwrap();
    let actions: Vec<HistoryAction> = entries.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![HistoryAction::Add, HistoryAction::Update, HistoryAction::Delete]
    );
    let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(entries[1].payload, "cat is a dog");
}

async fn history_is_per_id(log: &dyn HistoryLog) {
    log.append(&MemoryId::from("a"), HistoryAction::Add, "x").await.unwrap();
    log.append(&MemoryId::from("b"), HistoryAction::Add, "y").await.unwrap();

    let a = log.history(&MemoryId::from("a")).await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].seq, 1);
    assert!(log.history(&MemoryId::from("zzz")).await.unwrap().is_empty());
}

async fn history_concurrent_appends_get_distinct_seqs(log: Arc<dyn HistoryLog>) {
    let id = MemoryId::from("busy");
    let appends = (0..6).map(|i| {
        let log = log.clone();
        let id = id.clone();
        tokio::spawn(async move {
            log.append(&id, HistoryAction::Update, &format!("v{i}"))
                .await
        })
    });
    for joined in join_all(appends).await {
        joined.unwrap().unwrap();
    }

    let seqs: Vec<u64> = log.history(&id).await.unwrap().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=6).collect::<Vec<u64>>());
}

async fn history_clear(log: &dyn HistoryLog) {
    let id = MemoryId::from("m1");
    log.append(&id, HistoryAction::Add, "x").await.unwrap();
    log.clear().await.unwrap();
    assert!(log.history(&id).await.unwrap().is_empty());
}

// ===========================================================================
// Backend wiring
// ===========================================================================

macro_rules! contract_tests {
    ($backend:ident, $records:expr, $metadata:expr, $history:expr) => {
        mod $backend {
            use super::*;

            #[tokio::test]
            async fn record_insert_then_get() {
                super::record_insert_then_get(&*$records).await;
            }

            #[tokio::test]
            async fn record_get_missing_is_none() {
                super::record_get_missing_is_none(&*$records).await;
            }

            #[tokio::test]
            async fn record_duplicate_insert_conflicts() {
                super::record_duplicate_insert_conflicts(&*$records).await;
            }

            #[tokio::test]
            async fn record_deleted_id_is_never_reused() {
                super::record_deleted_id_is_never_reused(&*$records).await;
            }

            #[tokio::test]
            async fn record_delete_missing_returns_false() {
                super::record_delete_missing_returns_false(&*$records).await;
            }

            #[tokio::test]
            async fn record_replace_content_keeps_id() {
                super::record_replace_content_keeps_id(&*$records).await;
            }

            #[tokio::test]
            async fn record_replace_missing_is_not_found() {
                super::record_replace_missing_is_not_found(&*$records).await;
            }

            #[tokio::test]
            async fn record_list_respects_scope() {
                super::record_list_respects_scope(&*$records).await;
            }

            #[tokio::test]
            async fn record_search_filters_and_orders() {
                super::record_search_filters_and_orders(&*$records).await;
            }

            #[tokio::test]
            async fn record_search_threshold_is_strict() {
                super::record_search_threshold_is_strict(&*$records).await;
            }

            #[tokio::test]
            async fn record_clear_retires_everything() {
                super::record_clear_retires_everything(&*$records).await;
            }

            #[tokio::test]
            async fn metadata_set_importance_creates_entry() {
                super::metadata_set_importance_creates_entry(&*$metadata).await;
            }

            #[tokio::test]
            async fn metadata_set_importance_keeps_access_data() {
                super::metadata_set_importance_keeps_access_data(&*$metadata).await;
            }

            #[tokio::test]
            async fn metadata_bump_increments_and_never_rewinds() {
                super::metadata_bump_increments_and_never_rewinds(&*$metadata).await;
            }

            #[tokio::test]
            async fn metadata_bump_missing_creates_entry() {
                super::metadata_bump_missing_creates_entry(&*$metadata).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
            async fn metadata_concurrent_bumps_are_not_lost() {
                super::metadata_concurrent_bumps_are_not_lost($metadata).await;
            }

            #[tokio::test]
            async fn metadata_delete_and_list() {
                super::metadata_delete_and_list(&*$metadata).await;
            }

            #[tokio::test]
            async fn history_append_order_and_seq() {
                super::history_append_order_and_seq(&*$history).await;
            }

            #[tokio::test]
            async fn history_is_per_id() {
                super::history_is_per_id(&*$history).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
            async fn history_concurrent_appends_get_distinct_seqs() {
                super::history_concurrent_appends_get_distinct_seqs($history).await;
            }

            #[tokio::test]
            async fn history_clear() {
                super::history_clear(&*$history).await;
            }
        }
    };
}

async fn surreal() -> StateHandle {
    StateHandle::setup_db().await.expect("setup_db() failed")
}

contract_tests!(
    in_memory,
    Arc::new(InMemoryRecordStore::new()) as Arc<dyn RecordStore>,
    Arc::new(InMemoryMetadataStore::new()) as Arc<dyn MetadataStore>,
    Arc::new(InMemoryHistoryLog::new()) as Arc<dyn HistoryLog>
);

contract_tests!(
    surreal_mem,
    Arc::new(surreal().await.record_store()) as Arc<dyn RecordStore>,
    Arc::new(surreal().await.metadata_store()) as Arc<dyn MetadataStore>,
    Arc::new(surreal().await.history_log()) as Arc<dyn HistoryLog>
);
