//! ObjectStore against a real ClickHouse server.
//!
//! Needs Docker (or `PRESENCE_TEST_CLICKHOUSE_URL`); run with
//! `cargo test -p integration-tests -- --ignored`.

use chrono::{Duration as ChronoDuration, Utc};
use clickhouse_client::{
    count_objects, health::init_schema, query_objects, truncate_objects, ObjectStore,
};
use engine_core::{Object, ObjectRepository};
use integration_tests::containers::ClickHouseContainer;

fn object(id: i64, age_secs: i64) -> Object {
    let mut object = Object::new(id);
    object.online = true;
    object.mark_seen(Utc::now() - ChronoDuration::seconds(age_secs));
    object
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_upsert_replaces_and_sweep_deletes() {
    let container = ClickHouseContainer::start("presence_store_test").await;
    let client = container.client();
    init_schema(&client).await.unwrap();
    // Schema bootstrap is idempotent
    init_schema(&client).await.unwrap();

    let store = ObjectStore::new(client.clone());
    truncate_objects(store.client()).await.unwrap();

    let written = store
        .upsert(&[object(1, 120), object(2, 0), object(3, 90)])
        .await
        .unwrap();
    assert_eq!(written, 3);

    // Object 1 is seen again and must survive the sweep
    store.upsert(&[object(1, 0)]).await.unwrap();
    assert_eq!(count_objects(&client).await.unwrap(), 3);

    let expired = store
        .delete_expired(Utc::now() - ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let rows = query_objects(&client, 10).await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.object_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(rows.iter().all(|r| r.last_seen_at().is_some()));

    // Nothing left to expire
    let expired = store
        .delete_expired(Utc::now() - ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert_eq!(expired, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_empty_upsert_is_a_no_op() {
    let container = ClickHouseContainer::start("presence_empty_test").await;
    let client = container.client();
    init_schema(&client).await.unwrap();

    let store = ObjectStore::new(client);
    truncate_objects(store.client()).await.unwrap();

    assert_eq!(store.upsert(&[]).await.unwrap(), 0);
    assert_eq!(count_objects(store.client()).await.unwrap(), 0);
}
