//! Like ledger, reconciliation and the hot list over SQLite.

mod common;

use std::time::Duration;

use common::harness;
use mf_core::error::FeedError;
use mf_core::keys;
use mf_core::traits::{CacheStore, PostRepo};

#[tokio::test]
async fn toggling_twice_restores_state() {
    let h = harness().await;
    let post = h.post(1, "hello").await;

    let liked = h.engine.toggle_like(7, post.id).await.unwrap();
    assert!(liked.liked);
    assert_eq!(liked.like_count, 1);

    let unliked = h.engine.toggle_like(7, post.id).await.unwrap();
    assert!(!unliked.liked);
    assert_eq!(unliked.like_count, 0);
    assert_eq!(h.engine.like_count(post.id).await.unwrap(), 0);
}

#[tokio::test]
async fn liking_a_missing_post_is_not_found() {
    let h = harness().await;
    h.post(1, "exists").await;
    let err = h.engine.toggle_like(7, 999).await.unwrap_err();
    assert!(matches!(err, FeedError::NotFound(..)), "{err}");
}

#[tokio::test]
async fn reconciliation_persists_counters_and_is_idempotent() {
    let h = harness().await;
    let mut expected = Vec::new();
    for n in 0..6u64 {
        let post = h.post(1, &format!("post {n}")).await;
        for user in 0..n {
            h.engine.toggle_like(100 + user, post.id).await.unwrap();
        }
        expected.push((post.id, n));
    }

    let first = h.engine.reconciler().run_cycle().await.unwrap();
    // the zero-like post never got a counter
    assert_eq!(first.synced, 5);
    for (id, count) in &expected {
        let stored = h.repo.get_post(*id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, *count);
    }

    let second = h.engine.reconciler().run_cycle().await.unwrap();
    assert_eq!(second.synced, first.synced);
    for (id, count) in &expected {
        let stored = h.repo.get_post(*id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, *count);
    }
}

#[tokio::test]
async fn hot_list_is_ranked_and_capped() {
    let h = harness().await;
    let mut posts = Vec::new();
    for n in 0..4 {
        posts.push(h.post(1, &format!("post {n}")).await);
    }
    for (post, likes) in posts.iter().zip([2u64, 0, 3, 1]) {
        for user in 0..likes {
            h.engine.toggle_like(50 + user, post.id).await.unwrap();
        }
    }
    h.engine.reconciler().run_cycle().await.unwrap();

    let hot = h.engine.list_hot(3).await.unwrap();
    assert_eq!(hot.ids(), vec![posts[2].id, posts[0].id, posts[3].id]);
    assert!(hot.posts.windows(2).all(|w| w[0].like_count >= w[1].like_count));
    assert_eq!(hot.next_cursor, None);
}

#[tokio::test]
async fn double_delete_keeps_reads_fresh() {
    let h = harness().await;
    let a = h.post(1, "a").await;
    let b = h.post(1, "b").await;
    h.engine.toggle_like(10, a.id).await.unwrap();
    h.engine.reconciler().run_cycle().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    // warm the hot list with `a` on top
    assert_eq!(h.engine.list_hot(10).await.unwrap().ids(), vec![a.id, b.id]);

    // `b` overtakes `a`
    for user in 20..22 {
        h.engine.toggle_like(user, b.id).await.unwrap();
    }
    h.engine.reconciler().run_cycle().await.unwrap();

    // immediate read rebuilds from the updated store
    assert_eq!(h.engine.list_hot(10).await.unwrap().ids(), vec![b.id, a.id]);

    // a stale list written inside the window is cleared by the second delete
    h.cache
        .list_push(keys::HOT_POSTS, &[a.id.to_string(), b.id.to_string()])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!h.cache.exists(keys::HOT_POSTS).await.unwrap());
    assert_eq!(h.engine.list_hot(10).await.unwrap().ids(), vec![b.id, a.id]);
}

#[tokio::test]
async fn empty_store_serves_an_empty_hot_list() {
    let h = harness().await;
    assert!(h.engine.list_hot(10).await.unwrap().posts.is_empty());
    assert!(h.cache.exists(keys::HOT_POSTS_EMPTY).await.unwrap());

    // publishing clears the marker, so the very next read sees the post
    let post = h.post(1, "first").await;
    assert!(!h.cache.exists(keys::HOT_POSTS_EMPTY).await.unwrap());
    assert_eq!(h.engine.list_hot(10).await.unwrap().ids(), vec![post.id]);
}
