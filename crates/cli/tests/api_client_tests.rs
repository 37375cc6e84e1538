#[path = "../src/api_client.rs"]
#[allow(dead_code)] // Some fields are read by the binary but not by tests
mod api_client;

use api_client::ApiClient;
use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

#[tokio::test]
async fn api_client_success_paths() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    let health_mock = server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200).json_body(json!({
            "status": "ok",
            "version": "0.1.0",
            "upstream": "telegram",
            "metadata": "ok",
            "cache_entries": 12
        }));
    });

    let stats_mock = server.mock(|when, then| {
        when.method(GET).path("/stats");
        then.status(200).json_body(json!({
            "total_files": 3,
            "total_users": 2,
            "total_downloads": 41,
            "total_bytes": 1048576
        }));
    });

    let client = ApiClient::new(&server.base_url()).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.upstream, "telegram");
    assert_eq!(health.metadata, "ok");
    assert_eq!(health.cache_entries, 12);
    assert_eq!(health.version, "0.1.0");

    let stats = client.stats().await.unwrap();
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_downloads, 41);
    assert_eq!(stats.total_bytes, 1048576);

    health_mock.assert();
    stats_mock.assert();
}

#[tokio::test]
async fn api_client_reads_degraded_health() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(503).json_body(json!({
            "status": "degraded",
            "version": "0.1.0",
            "upstream": "s3",
            "metadata": "unavailable",
            "cache_entries": 0
        }));
    });

    let client = ApiClient::new(&server.base_url()).unwrap();
    let health = client.health().await.unwrap();
    assert_eq!(health.status, "degraded");
    assert_eq!(health.metadata, "unavailable");
}

#[tokio::test]
async fn api_client_returns_error_body_on_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/stats");
        then.status(500).json_body(json!({
            "ok": false,
            "error_code": 500,
            "description": "metadata store unavailable"
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(502).body("bad gateway");
    });

    let client = ApiClient::new(&server.base_url()).unwrap();

    let err = client.stats().await.unwrap_err().to_string();
    assert!(err.contains("API error (500"));
    assert!(err.contains("code 500"));
    assert!(err.contains("metadata store unavailable"));

    let err = client.health().await.unwrap_err().to_string();
    assert!(err.contains("502"));
    assert!(err.contains("bad gateway"));
}
