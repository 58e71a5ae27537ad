//! Invariants that must hold under contention.

use kvsync::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_mutex_never_has_two_holders() {
    let client = SyncClient::in_memory();
    let inside = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let inside = inside.clone();
        let completed = completed.clone();
        handles.push(tokio::spawn(async move {
            let lock = client.mutex_lock("critical");
            lock.lock(None).await.unwrap();

            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
            tokio::time::sleep(Duration::from_millis(50)).await;
            inside.fetch_sub(1, Ordering::SeqCst);

            assert!(lock.unlock().await.unwrap());
            completed.fetch_add(1, Ordering::SeqCst);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(completed.load(Ordering::SeqCst), 8);
}

#[tokio::test(start_paused = true)]
async fn test_semaphore_permits_are_conserved() {
    let client = SyncClient::in_memory();
    let sem = client.semaphore("workers");
    sem.try_set_permits(3).await.unwrap();

    let inside = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        let inside = inside.clone();
        handles.push(tokio::spawn(async move {
            let sem = client.semaphore("workers");
            assert!(sem.acquire(1, None).await.unwrap());

            assert!(inside.fetch_add(1, Ordering::SeqCst) < 3);
            tokio::time::sleep(Duration::from_millis(30)).await;
            inside.fetch_sub(1, Ordering::SeqCst);

            sem.release(1).await.unwrap();
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(sem.available_permits().await.unwrap(), 3);
}

#[tokio::test]
async fn test_reentrant_write_needs_matching_unlocks() {
    let client = SyncClient::in_memory();
    let rw = client.read_write_lock("doc");
    let other = client.read_write_lock("doc");

    for _ in 0..3 {
        assert!(rw.write_lock().try_lock(Duration::ZERO, None).await.unwrap());
    }
    assert_eq!(rw.write_lock().hold_count().await.unwrap(), 3);

    for _ in 0..2 {
        assert!(rw.write_lock().unlock().await.unwrap());
        assert!(!other.write_lock().try_lock(Duration::ZERO, None).await.unwrap());
    }

    assert!(rw.write_lock().unlock().await.unwrap());
    assert!(!rw.is_write_locked().await.unwrap());
    assert!(other.write_lock().try_lock(Duration::ZERO, None).await.unwrap());
}

#[tokio::test]
async fn test_latch_count_never_goes_negative() {
    let client = SyncClient::in_memory();
    let latch = client.count_down_latch("gate");
    latch.try_set_count(2).await.unwrap();

    for expected in [1, 0, 0, 0] {
        assert_eq!(latch.count_down().await.unwrap(), expected);
    }
    assert!(latch.wait(Some(Duration::ZERO)).await.unwrap());
}

#[tokio::test]
async fn test_key_layout_is_shared_between_clients() {
    // Two clients over one store behave like two processes over one Redis.
    let store = Arc::new(MemoryStore::new());
    let a = SyncClient::new(store.clone(), SyncConfig::default()).unwrap();
    let b = SyncClient::new(store.clone(), SyncConfig::default()).unwrap();

    a.mutex_lock("res").lock(None).await.unwrap();
    assert!(b.mutex_lock("res").is_locked().await.unwrap());

    a.read_write_lock("doc").read_lock().lock(None).await.unwrap();
    assert!(store.exists("doc:read").await.unwrap());
    assert!(!store.exists("doc:write").await.unwrap());
    assert!(
        !b.read_write_lock("doc")
            .write_lock()
            .try_lock(Duration::ZERO, None)
            .await
            .unwrap()
    );
}

#[test]
fn test_semaphore_release_is_not_capped() {
    tokio_test::block_on(async {
        let client = SyncClient::in_memory();
        let sem = client.semaphore("pool");
        sem.try_set_permits(1).await.unwrap();

        sem.release(2).await.unwrap();
        assert_eq!(sem.available_permits().await.unwrap(), 3);
        assert_eq!(sem.drain_permits().await.unwrap(), 3);
        assert_eq!(sem.available_permits().await.unwrap(), 0);
    });
}
