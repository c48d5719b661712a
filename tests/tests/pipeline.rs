//! Consumer → enrichment → store, driven through the in-memory broker.

use integration_tests::fixtures::id_payload;
use integration_tests::setup::{consumer_config, Pipeline};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_full_batch_persists_online_objects() {
    let pipeline = Pipeline::start(consumer_config(2, 5000), &[15], &[]).await;

    pipeline.source.send(id_payload(&[12, 98]));
    pipeline.source.send(id_payload(&[1, 15]));

    assert!(
        pipeline
            .wait_until(WAIT, |p| p.source.log.commits().len() == 2)
            .await
    );
    assert_eq!(pipeline.source.log.commits(), vec![0, 1]);
    assert_eq!(pipeline.store.ids(), vec![1, 12, 98]);

    let stored = pipeline.store.get(12).unwrap();
    assert!(stored.online);
    assert!(stored.last_seen.is_some());

    pipeline.consumer.stop().await;
    assert!(pipeline.source.log.is_closed());
}

#[tokio::test]
async fn test_partial_batch_flushes_after_period() {
    let pipeline = Pipeline::start(consumer_config(10, 100), &[], &[]).await;

    pipeline.source.send(id_payload(&[7]));

    assert!(pipeline.wait_until(WAIT, |p| p.store.get(7).is_some()).await);
    assert!(
        pipeline
            .wait_until(WAIT, |p| p.source.log.commits() == vec![0])
            .await
    );

    pipeline.consumer.stop().await;
}

#[tokio::test]
async fn test_malformed_payload_is_skipped_and_committed() {
    let pipeline = Pipeline::start(consumer_config(2, 5000), &[], &[]).await;

    pipeline.source.send("not json");
    pipeline.source.send(id_payload(&[3]));

    assert!(
        pipeline
            .wait_until(WAIT, |p| p.source.log.commits().len() == 2)
            .await
    );
    assert_eq!(pipeline.store.ids(), vec![3]);

    pipeline.consumer.stop().await;
}

#[tokio::test]
async fn test_duplicate_ids_are_looked_up_once() {
    let pipeline = Pipeline::start(consumer_config(2, 5000), &[], &[]).await;

    pipeline.source.send(id_payload(&[4, 4]));
    pipeline.source.send(id_payload(&[4]));

    assert!(
        pipeline
            .wait_until(WAIT, |p| p.source.log.commits().len() == 2)
            .await
    );
    assert_eq!(pipeline.status.hits(4), 1);
    assert_eq!(pipeline.store.ids(), vec![4]);

    pipeline.consumer.stop().await;
}

#[tokio::test]
async fn test_all_offline_batch_is_committed_without_writes() {
    let pipeline = Pipeline::start(consumer_config(1, 5000), &[21, 22], &[]).await;

    pipeline.source.send(id_payload(&[21, 22]));

    assert!(
        pipeline
            .wait_until(WAIT, |p| p.source.log.commits() == vec![0])
            .await
    );
    assert!(pipeline.store.ids().is_empty());
    assert_eq!(pipeline.store.upsert_calls(), 0);

    pipeline.consumer.stop().await;
}

#[tokio::test]
async fn test_storage_failures_are_retried() {
    let pipeline = Pipeline::start(consumer_config(1, 5000), &[], &[]).await;
    pipeline.store.fail_next_upserts(2);

    pipeline.source.send(id_payload(&[8]));

    assert!(pipeline.wait_until(WAIT, |p| p.store.get(8).is_some()).await);
    assert_eq!(pipeline.store.upsert_calls(), 3);
    assert!(
        pipeline
            .wait_until(WAIT, |p| p.source.log.commits() == vec![0])
            .await
    );

    pipeline.consumer.stop().await;
}

#[tokio::test]
async fn test_stop_during_lookup_retries_leaves_batch_uncommitted() {
    let pipeline = Pipeline::start(consumer_config(1, 200), &[], &[500]).await;

    pipeline.source.send(id_payload(&[500, 9]));

    assert!(pipeline.wait_until(WAIT, |p| p.status.hits(500) >= 2).await);
    tokio::time::timeout(WAIT, pipeline.consumer.stop())
        .await
        .expect("consumer did not stop");

    assert!(pipeline.token.is_cancelled());
    assert!(pipeline.source.log.commits().is_empty());
    assert!(pipeline.store.ids().is_empty());
    assert!(pipeline.source.log.is_closed());
}
