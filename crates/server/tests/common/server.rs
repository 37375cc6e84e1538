//! Server test utilities.

use super::upstream::MockUpstream;
use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, StatusCode};
use bytes::Bytes;
use filegate_core::ResourceKind;
use filegate_core::config::{AppConfig, MetadataConfig};
use filegate_metadata::{FileRow, MetadataStore, SqliteStore};
use filegate_server::{AppState, ManualClock, MetadataCache, create_router};
use filegate_signer::TokenCodec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub upstream: Arc<MockUpstream>,
    pub clock: Arc<ManualClock>,
    _temp_dir: TempDir,
}

/// Buffered response for assertions.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }

    pub fn error_code(&self) -> Option<u64> {
        self.json()["error_code"].as_u64()
    }
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with a mock upstream and temporary metadata.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let codec = TokenCodec::from_config(&config.token).expect("Failed to build codec");
        let upstream = Arc::new(MockUpstream::new());
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(MetadataCache::with_clock(
            config.cache.ttl(),
            config.cache.capacity,
            clock.clone(),
        ));

        let state = AppState::with_cache(config, codec, upstream.clone(), metadata, cache);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            upstream,
            clock,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Register a blob upstream, record it, and return a freshly issued token.
    pub async fn publish(&self, resource_id: &str, kind: ResourceKind, data: Bytes) -> String {
        let token = self.state.codec.encode(resource_id).expect("Failed to encode token");
        let file = kind.file().clone();
        let row = FileRow {
            file_id: file.identifier.clone(),
            message_id: resource_id.to_string(),
            user_id: "user-1".to_string(),
            username: Some("tester".to_string()),
            file_name: Some(file.display_name.clone()),
            file_size: file.size as i64,
            file_type: Some(kind.as_str().to_string()),
            secret_token: token.clone(),
            created_at: OffsetDateTime::now_utc(),
            downloads: 0,
        };
        self.metadata()
            .create_file(&row)
            .await
            .expect("Failed to create file record");
        self.upstream.insert(resource_id, kind, data);
        token
    }

    /// Send a request through the router without reading the body.
    pub async fn send(&self, method: &str, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request through the router and buffer the response.
    pub async fn request(&self, method: &str, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
        let response = self.send(method, uri, headers).await;

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request("GET", uri, &[]).await
    }

    /// Poll until the download counter for `resource_id` reaches `expected`.
    pub async fn wait_for_downloads(&self, resource_id: &str, expected: i64) -> i64 {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let downloads = self
                .metadata()
                .get_file(resource_id)
                .await
                .unwrap()
                .map(|row| row.downloads)
                .unwrap_or_default();
            if downloads >= expected || tokio::time::Instant::now() > deadline {
                return downloads;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
