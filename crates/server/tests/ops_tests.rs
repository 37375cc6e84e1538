//! Integration tests for health, stats and metrics endpoints.

mod common;

use axum::http::StatusCode;
use common::{TestServer, document, seeded_bytes};
use filegate_metadata::models::UserRow;
use time::OffsetDateTime;

#[tokio::test]
async fn health_reports_components() {
    let server = TestServer::new().await;

    let resp = server.get("/health").await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["metadata"], "ok");
    assert_eq!(body["upstream"], "mock");
    assert_eq!(body["cache_entries"], 0);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn health_counts_cached_descriptors() {
    let server = TestServer::new().await;
    let token = server
        .publish("2001", document("doc-1", "a.pdf", 4), seeded_bytes(1, 4))
        .await;
    server.get(&format!("/dl/{token}")).await;

    let resp = server.get("/health").await;
    assert_eq!(resp.json()["cache_entries"], 1);
}

#[tokio::test]
async fn stats_aggregates_records() {
    let server = TestServer::new().await;
    let now = OffsetDateTime::now_utc();
    server
        .metadata()
        .register_user(&UserRow {
            user_id: "user-1".to_string(),
            username: Some("tester".to_string()),
            first_name: None,
            last_name: None,
            first_used: now,
            total_files: 0,
            last_activity: now,
        })
        .await
        .unwrap();

    let token = server
        .publish("2002", document("doc-2", "b.pdf", 100), seeded_bytes(2, 100))
        .await;
    server
        .publish("2003", document("doc-3", "c.pdf", 50), seeded_bytes(3, 50))
        .await;
    server.get(&format!("/dl/{token}")).await;
    server.wait_for_downloads("2002", 1).await;

    let resp = server.get("/stats").await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["total_files"], 2);
    assert_eq!(body["total_users"], 1);
    assert_eq!(body["total_downloads"], 1);
    assert_eq!(body["total_bytes"], 150);
}

#[tokio::test]
async fn metrics_endpoint_follows_config() {
    filegate_server::metrics::register_metrics();

    let server = TestServer::new().await;
    let resp = server.get("/metrics").await;
    assert_eq!(resp.status, StatusCode::OK);
    let text = String::from_utf8(resp.body.to_vec()).unwrap();
    assert!(text.contains("filegate_"));

    let server = TestServer::with_config(|config| {
        config.server.metrics_enabled = false;
    })
    .await;
    let resp = server.get("/metrics").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}
