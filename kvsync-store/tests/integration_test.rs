//! Integration tests for kvsync-store
//!
//! The same contract runs against every backend. Redis tests need a server at
//! `REDIS_URL` (default `redis://localhost:6379`) and are ignored by default.

use kvsync_store::*;
use std::sync::Arc;

async fn check_lock_ops(store: &dyn SyncStore, key: &str) {
    store.delete(key).await.unwrap();

    assert!(store.set_if_absent(key, "owner-a", Some(30)).await.unwrap());
    assert!(!store.set_if_absent(key, "owner-b", Some(30)).await.unwrap());
    assert_eq!(store.get(key).await.unwrap().as_deref(), Some("owner-a"));

    let ttl = store.ttl(key).await.unwrap().unwrap();
    assert!(ttl.as_secs() <= 30);

    assert!(!store.compare_and_delete(key, "owner-b").await.unwrap());
    assert!(store.exists(key).await.unwrap());
    assert!(store.compare_and_delete(key, "owner-a").await.unwrap());
    assert!(!store.exists(key).await.unwrap());
    assert_eq!(store.ttl(key).await.unwrap(), None);
}

async fn check_counter_ops(store: &dyn SyncStore, key: &str) {
    store.delete(key).await.unwrap();

    assert!(!store.decrement_if_at_least(key, 1).await.unwrap());
    assert_eq!(store.decrement_if_positive(key).await.unwrap(), None);
    assert_eq!(store.drain(key).await.unwrap(), 0);
    assert!(!store.exists(key).await.unwrap());

    assert!(store.set_if_absent(key, "3", None).await.unwrap());
    assert!(!store.decrement_if_at_least(key, 4).await.unwrap());
    assert!(store.decrement_if_at_least(key, 2).await.unwrap());
    assert_eq!(store.incr_by(key, 5).await.unwrap(), 6);
    assert_eq!(store.decrement_if_positive(key).await.unwrap(), Some(5));
    assert_eq!(store.drain(key).await.unwrap(), 5);
    assert_eq!(store.get(key).await.unwrap().as_deref(), Some("0"));
    assert_eq!(store.decrement_if_positive(key).await.unwrap(), None);

    store.delete(key).await.unwrap();
}

async fn check_hash_ops(store: &dyn SyncStore, key: &str, peer: &str) {
    store.delete(key).await.unwrap();
    store.delete(peer).await.unwrap();

    let write = FieldAcquire::new(key, "w1", 30).exclusive();
    assert!(store.acquire_field(write).await.unwrap());
    assert!(store.acquire_field(write).await.unwrap());
    assert!(
        !store
            .acquire_field(FieldAcquire::new(key, "w2", 30).exclusive())
            .await
            .unwrap()
    );
    assert_eq!(store.hget(key, "w1").await.unwrap(), Some(2));
    assert_eq!(store.hlen(key).await.unwrap(), 1);

    // The peer side is blocked while this side exists.
    assert!(
        !store
            .acquire_field(FieldAcquire::new(peer, "r1", 30).blocked_by(key))
            .await
            .unwrap()
    );
    assert!(!store.exists(peer).await.unwrap());

    assert_eq!(store.release_field(key, "w2").await.unwrap(), None);
    assert_eq!(store.release_field(key, "w1").await.unwrap(), Some(1));
    assert_eq!(store.release_field(key, "w1").await.unwrap(), Some(0));
    assert!(!store.exists(key).await.unwrap());

    assert!(
        store
            .acquire_field(FieldAcquire::new(peer, "r1", 30).blocked_by(key))
            .await
            .unwrap()
    );
    store.delete(peer).await.unwrap();
}

// =============================================================================
// Memory Backend
// =============================================================================

#[tokio::test]
async fn test_memory_lock_ops() {
    check_lock_ops(&MemoryStore::new(), "it:lock").await;
}

#[tokio::test]
async fn test_memory_counter_ops() {
    check_counter_ops(&MemoryStore::new(), "it:counter").await;
}

#[tokio::test]
async fn test_memory_hash_ops() {
    check_hash_ops(&MemoryStore::new(), "it:rw:write", "it:rw:read").await;
}

#[test]
fn test_memory_clear() {
    tokio_test::block_on(async {
        let store = MemoryStore::new();
        store.set_if_absent("a", "1", None).await.unwrap();
        store
            .acquire_field(FieldAcquire::new("b", "owner", 30))
            .await
            .unwrap();
        assert_eq!(store.key_count(), 2);

        store.clear();
        assert_eq!(store.key_count(), 0);
        assert!(!store.exists("a").await.unwrap());
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_set_if_absent_has_one_winner() {
    let store = Arc::new(MemoryStore::new());

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .set_if_absent("race", &format!("owner-{}", i), Some(30))
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_decrement_never_oversubscribes() {
    let store = Arc::new(MemoryStore::new());
    store.set_if_absent("permits", "5", None).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.decrement_if_at_least("permits", 1).await.unwrap()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 5);
    assert_eq!(store.get("permits").await.unwrap().as_deref(), Some("0"));
}

// =============================================================================
// Redis Backend
// =============================================================================

#[cfg(feature = "redis")]
async fn redis_store() -> RedisStore {
    RedisStore::new(RedisConfig::from_env().build()).await.unwrap()
}

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_lock_ops() {
    check_lock_ops(&redis_store().await, "kvsync:it:lock").await;
}

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_counter_ops() {
    check_counter_ops(&redis_store().await, "kvsync:it:counter").await;
}

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_hash_ops() {
    check_hash_ops(
        &redis_store().await,
        "kvsync:it:rw:write",
        "kvsync:it:rw:read",
    )
    .await;
}

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_health_check() {
    let store = redis_store().await;
    store.health_check().await.unwrap();
    assert_eq!(store.backend_name(), "redis");
}
