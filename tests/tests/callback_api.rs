//! `/callback` through the real router, with mocked and in-memory producers.

use axum::http::StatusCode;
use integration_tests::mocks::{MemoryWriter, MockProducer};
use integration_tests::setup::api_server;
use redpanda::{Producer, ProducerConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_callback_publishes_id_list() {
    let producer = MockProducer::new();
    let server = api_server(Arc::new(producer.clone()));

    let response = server
        .post("/callback")
        .json(&json!({ "object_ids": [12, 98, 1] }))
        .await;

    response.assert_status_ok();
    response.assert_text("ok");
    assert!(eventually(|| producer.published_ids() == vec![vec![12, 98, 1]]).await);
}

#[tokio::test]
async fn test_malformed_body_is_rejected_without_publishing() {
    let producer = MockProducer::new();
    let server = api_server(Arc::new(producer.clone()));

    let response = server.post("/callback").text("[12, 98").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "VALID_001");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(producer.payloads().is_empty());
}

#[tokio::test]
async fn test_stopped_producer_still_answers_ok() {
    let producer = MockProducer::new();
    producer.set_should_fail(true);
    let server = api_server(Arc::new(producer.clone()));

    let response = server
        .post("/callback")
        .json(&json!({ "object_ids": [5] }))
        .await;

    response.assert_status_ok();

    let health: serde_json::Value = server.get("/health").await.json();
    assert_eq!(health["producer_accepting"], false);
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_callback_reaches_record_writer() {
    let writer = MemoryWriter::new();
    let producer = Arc::new(Producer::start(
        ProducerConfig {
            topic: "objects".to_string(),
            ..Default::default()
        },
        writer.clone(),
    ));
    let server = api_server(producer.clone());

    for ids in [json!([1, 2]), json!([3])] {
        server
            .post("/callback")
            .json(&json!({ "object_ids": ids }))
            .await
            .assert_status_ok();
    }

    assert!(eventually(|| writer.records().len() == 2).await);
    producer.stop().await;

    let mut records: Vec<Vec<i64>> = writer
        .records()
        .iter()
        .map(|r| serde_json::from_slice(r).unwrap())
        .collect();
    records.sort();
    assert_eq!(records, vec![vec![1, 2], vec![3]]);
    assert!(writer.is_closed());
}
