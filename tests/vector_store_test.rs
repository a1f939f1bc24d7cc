//! SQLite vector store behaviour beyond the unit tests: batches and cascades.

mod helpers;

use helpers::{test_store, DIMENSION};
use retrieval_gateway::domain::models::{MetadataFilter, VectorRecord};
use retrieval_gateway::{GatewayError, VectorStore};

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIMENSION];
    v[axis] = 1.0;
    v
}

fn record(chunk_id: &str, document_id: &str, axis: usize) -> VectorRecord {
    VectorRecord::new(chunk_id, document_id, unit(axis), "local:hash-v1")
}

#[tokio::test]
async fn test_batch_upsert_writes_all_records() {
    let store = test_store().await;
    let written = store
        .upsert_batch(&[record("a", "d", 0), record("b", "d", 1), record("c", "e", 2)])
        .await
        .unwrap();
    assert_eq!(written, 3);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_batch_with_bad_dimension_writes_nothing() {
    let store = test_store().await;
    let bad = VectorRecord::new("bad", "d", vec![1.0, 2.0], "local:hash-v1");

    let err = store
        .upsert_batch(&[record("a", "d", 0), bad])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::DimensionMismatch { actual: 2, .. }));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_batch_failure_rolls_back_and_reports_position() {
    let store = test_store().await;
    sqlx::query(
        "CREATE TRIGGER reject_bad BEFORE INSERT ON vector_records
         WHEN NEW.chunk_id = 'bad'
         BEGIN SELECT RAISE(ABORT, 'rejected by trigger'); END;",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let err = store
        .upsert_batch(&[record("a", "d", 0), record("bad", "d", 1), record("c", "d", 2)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::StorageWrite {
            position: Some(1),
            ..
        }
    ));
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.get("a").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_document_cascades() {
    let store = test_store().await;
    store
        .upsert_batch(&[record("a", "d", 0), record("b", "d", 1), record("c", "keep", 2)])
        .await
        .unwrap();
    store.mark_document_processed("d", 2, 0).await.unwrap();

    assert_eq!(store.delete_document("d").await.unwrap(), 2);
    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.document_status("d").await.unwrap().is_none());

    let (orphans,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM vector_records WHERE document_id = 'd'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn test_ties_break_by_chunk_id() {
    let store = test_store().await;
    for id in ["z", "m", "a"] {
        store.upsert(&record(id, "d", 3)).await.unwrap();
    }

    let results = store
        .query_similar(&unit(3), 2, &MetadataFilter::new())
        .await
        .unwrap();
    let ids: Vec<_> = results.iter().map(|r| r.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "m"]);
}

#[tokio::test]
async fn test_upsert_can_move_chunk_between_documents() {
    let store = test_store().await;
    store.upsert(&record("c", "old", 0)).await.unwrap();
    store.upsert(&record("c", "new", 0)).await.unwrap();

    assert_eq!(store.get("c").await.unwrap().unwrap().document_id, "new");
    assert_eq!(store.delete_document("old").await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 1);
}
