//! Cache and singleflight behaviour of the embedding service.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{embedding_service, HashingProvider};
use retrieval_gateway::ModelProvider;

#[tokio::test]
async fn test_concurrent_requests_share_one_provider_call() {
    let provider = Arc::new(HashingProvider::new("local").with_delay(Duration::from_millis(100)));
    let dyn_provider: Arc<dyn ModelProvider> = provider.clone();
    let service = embedding_service(vec![dyn_provider]);

    let requests = (0..10).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.embed_text("  the same   text ", None).await })
    });
    let results = futures::future::join_all(requests).await;

    let first = results[0].as_ref().unwrap().as_ref().unwrap().vector.clone();
    for result in &results {
        let embedding = result.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(embedding.vector.vector, first.vector);
    }
    assert_eq!(provider.calls(), 1);
    assert_eq!(service.in_flight(), 0);
}

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let provider = Arc::new(HashingProvider::new("local"));
    let dyn_provider: Arc<dyn ModelProvider> = provider.clone();
    let service = embedding_service(vec![dyn_provider]);

    let first = service.embed_text("hello world", None).await.unwrap();
    assert!(!first.cache_hit);

    let second = service.embed_text("hello   world", None).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(provider.calls(), 1);
    assert_eq!(service.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_cache_is_scoped_per_provider() {
    let a = Arc::new(HashingProvider::new("alpha"));
    let b = Arc::new(HashingProvider::new("beta"));
    let (dyn_a, dyn_b): (Arc<dyn ModelProvider>, Arc<dyn ModelProvider>) = (a.clone(), b.clone());
    let service = embedding_service(vec![dyn_a, dyn_b]);

    let from_a = service.embed_text("shared", Some("alpha")).await.unwrap();
    let from_b = service.embed_text("shared", Some("beta")).await.unwrap();

    assert!(!from_b.cache_hit);
    assert_eq!(from_a.vector.provider_name, "alpha");
    assert_eq!(from_b.vector.provider_name, "beta");
    assert_eq!((a.calls(), b.calls()), (1, 1));
    assert_eq!(service.cache().len(), 2);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let provider = Arc::new(HashingProvider::new("local").with_poison("bad"));
    let dyn_provider: Arc<dyn ModelProvider> = provider.clone();
    let service = embedding_service(vec![dyn_provider]);

    assert!(service.embed_text("bad input", None).await.is_err());
    assert!(service.embed_text("bad input", None).await.is_err());
    assert_eq!(provider.calls(), 2);
    assert!(service.cache().is_empty());
}

#[tokio::test]
async fn test_empty_text_never_reaches_provider() {
    let provider = Arc::new(HashingProvider::new("local"));
    let dyn_provider: Arc<dyn ModelProvider> = provider.clone();
    let service = embedding_service(vec![dyn_provider]);

    let err = service.embed_text(" \t\n", None).await.unwrap_err();
    assert_eq!(err.kind(), retrieval_gateway::ErrorKind::InvalidInput);
    assert_eq!(provider.calls(), 0);
}
