//! Refresh queue: deduplication, claims, failures, stale-claim recovery

mod helpers;

use calassoc_common::{ManualClock, ObservationId};
use calassoc_engine::RefreshQueue;
use chrono::Duration;
use helpers::*;
use std::sync::Arc;

const OBS: ObservationId = ObservationId(7);

#[tokio::test]
async fn test_enqueue_deduplicates_pending() {
    let (_dir, pool) = create_test_db().await;
    let queue = RefreshQueue::new(pool);

    assert!(queue.enqueue(OBS).await.unwrap());
    assert!(!queue.enqueue(OBS).await.unwrap(), "second pending entry accepted");
    assert_eq!(queue.pending_count().await.unwrap(), 1);

    let added = queue
        .enqueue_all([OBS, ObservationId(8), ObservationId(9), ObservationId(8)])
        .await
        .unwrap();
    assert_eq!(added, 2);
    assert_eq!(queue.pending_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_claim_is_fifo_and_exclusive() {
    let (_dir, pool) = create_test_db().await;
    let clock = Arc::new(ManualClock::new(utc(2020, 1, 1)));
    let queue = RefreshQueue::with_clock(pool, clock.clone());

    queue.enqueue(ObservationId(2)).await.unwrap();
    clock.advance(Duration::seconds(1));
    queue.enqueue(ObservationId(1)).await.unwrap();

    let first = queue.claim_next("w1").await.unwrap().unwrap();
    assert_eq!(first.observation_id, ObservationId(2));
    assert!(first.in_progress);
    assert_eq!(first.claimed_by.as_deref(), Some("w1"));
    assert_eq!(first.claimed_at, Some(utc(2020, 1, 1) + Duration::seconds(1)));

    let second = queue.claim_next("w2").await.unwrap().unwrap();
    assert_eq!(second.observation_id, ObservationId(1));
    assert!(queue.claim_next("w3").await.unwrap().is_none());
    assert_eq!(queue.in_progress_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_claim_skips_observation_already_in_progress() {
    let (_dir, pool) = create_test_db().await;
    let queue = RefreshQueue::new(pool);

    queue.enqueue(OBS).await.unwrap();
    let claimed = queue.claim_next("w1").await.unwrap().unwrap();

    // Re-enqueued while being processed: a new pending entry is allowed
    assert!(queue.enqueue(OBS).await.unwrap());
    assert!(
        queue.claim_next("w2").await.unwrap().is_none(),
        "claimed a second entry for an in-progress observation"
    );

    assert!(queue.complete(claimed.id, "w1").await.unwrap());
    assert!(queue.get(claimed.id).await.unwrap().is_none());

    let next = queue.claim_next("w2").await.unwrap().unwrap();
    assert_eq!(next.observation_id, OBS);
    assert_ne!(next.id, claimed.id);
}

#[tokio::test]
async fn test_fail_keeps_entry_with_error() {
    let (_dir, pool) = create_test_db().await;
    let queue = RefreshQueue::new(pool);

    queue.enqueue(OBS).await.unwrap();
    let entry = queue.claim_next("w1").await.unwrap().unwrap();
    assert!(queue
        .fail(entry.id, "w1", "observation 7 has no ut_datetime")
        .await
        .unwrap());

    let failed = queue.list_failed().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].failed);
    assert!(!failed[0].in_progress);
    assert_eq!(
        failed[0].last_error.as_deref(),
        Some("observation 7 has no ut_datetime")
    );

    // Failed entries are not claimable and do not block a new pending one
    assert!(queue.claim_next("w1").await.unwrap().is_none());
    assert!(queue.enqueue(OBS).await.unwrap());
}

#[tokio::test]
async fn test_retry_failed_honours_dedup() {
    let (_dir, pool) = create_test_db().await;
    let queue = RefreshQueue::new(pool);

    for id in [1, 2] {
        queue.enqueue(ObservationId(id)).await.unwrap();
        let entry = queue.claim_next("w1").await.unwrap().unwrap();
        queue.fail(entry.id, "w1", "store error").await.unwrap();
    }
    // Observation 2 is pending again already
    queue.enqueue(ObservationId(2)).await.unwrap();

    let retried = queue.retry_failed().await.unwrap();
    assert_eq!(retried, 1);
    assert!(queue.list_failed().await.unwrap().is_empty());
    assert_eq!(queue.pending_count().await.unwrap(), 2);

    let entry = queue.claim_next("w1").await.unwrap().unwrap();
    assert_eq!(entry.last_error, None);
}

#[tokio::test]
async fn test_reaper_recovers_stale_claims() {
    let (_dir, pool) = create_test_db().await;
    let clock = Arc::new(ManualClock::new(utc(2020, 1, 1)));
    let queue = RefreshQueue::with_clock(pool, clock.clone());
    let timeout = Duration::minutes(10);

    queue.enqueue(OBS).await.unwrap();
    let abandoned = queue.claim_next("crashed").await.unwrap().unwrap();

    clock.advance(Duration::minutes(5));
    assert_eq!(queue.reap_stale(timeout).await.unwrap(), 0, "fresh claim reaped");

    clock.advance(Duration::minutes(6));
    assert_eq!(queue.reap_stale(timeout).await.unwrap(), 1);

    let released = queue.get(abandoned.id).await.unwrap().unwrap();
    assert!(!released.in_progress);
    assert_eq!(released.claimed_by, None);

    let reclaimed = queue.claim_next("w2").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, abandoned.id);
}

#[tokio::test]
async fn test_reaper_drops_stale_claim_with_pending_duplicate() {
    let (_dir, pool) = create_test_db().await;
    let clock = Arc::new(ManualClock::new(utc(2020, 1, 1)));
    let queue = RefreshQueue::with_clock(pool, clock.clone());

    queue.enqueue(OBS).await.unwrap();
    let abandoned = queue.claim_next("crashed").await.unwrap().unwrap();
    queue.enqueue(OBS).await.unwrap();

    clock.advance(Duration::hours(1));
    assert_eq!(queue.reap_stale(Duration::minutes(10)).await.unwrap(), 1);

    assert!(queue.get(abandoned.id).await.unwrap().is_none());
    assert_eq!(queue.pending_count().await.unwrap(), 1);
    assert_eq!(queue.in_progress_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_lost_claim_cannot_complete_or_fail() {
    let (_dir, pool) = create_test_db().await;
    let clock = Arc::new(ManualClock::new(utc(2020, 1, 1)));
    let queue = RefreshQueue::with_clock(pool, clock.clone());

    queue.enqueue(OBS).await.unwrap();
    let slow = queue.claim_next("slow").await.unwrap().unwrap();

    clock.advance(Duration::minutes(30));
    assert_eq!(queue.reap_stale(Duration::minutes(10)).await.unwrap(), 1);
    let fresh = queue.claim_next("fresh").await.unwrap().unwrap();
    assert_eq!(fresh.id, slow.id);

    // The slow worker finishing late must not remove the new claim
    assert!(!queue.complete(slow.id, "slow").await.unwrap());
    assert!(!queue.fail(slow.id, "slow", "late").await.unwrap());
    let current = queue.get(fresh.id).await.unwrap().unwrap();
    assert!(current.in_progress);
    assert!(!current.failed);
    assert_eq!(current.claimed_by.as_deref(), Some("fresh"));

    assert!(queue.fail(fresh.id, "fresh", "store error").await.unwrap());
    let failed = queue.list_failed().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].last_error.as_deref(), Some("store error"));

    // A failed entry is no longer anyone's claim
    assert!(!queue.complete(fresh.id, "fresh").await.unwrap());
}
