//! In-memory upstream with call counters.

use async_trait::async_trait;
use bytes::Bytes;
use filegate_core::{ResourceDescriptor, ResourceKind};
use filegate_upstream::range::parse_range;
use filegate_upstream::{
    ByteLocator, ByteStream, UpstreamError, UpstreamProvider, UpstreamResponse, UpstreamResult,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone)]
enum Entry {
    Object(ResourceKind),
    UnknownKind,
}

/// Upstream double serving registered blobs from memory.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockUpstream {
    entries: Mutex<HashMap<String, Entry>>,
    blobs: Mutex<HashMap<String, Bytes>>,
    fetch_failure: Mutex<Option<u16>>,
    fail_locators: AtomicBool,
    metadata_delay: Mutex<Option<Duration>>,
    locator_delay: Mutex<Option<Duration>>,
    fetch_delay: Mutex<Option<Duration>>,
    stall_bodies: AtomicBool,
    body_dropped: Arc<AtomicBool>,
    last_range: Mutex<Option<String>>,
    metadata_calls: AtomicUsize,
    locator_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under `resource_id`; bytes are keyed by the kind's identifier.
    pub fn insert(&self, resource_id: &str, kind: ResourceKind, data: Bytes) {
        self.blobs
            .lock()
            .unwrap()
            .insert(kind.file().identifier.clone(), data);
        self.entries
            .lock()
            .unwrap()
            .insert(resource_id.to_string(), Entry::Object(kind));
    }

    /// Make `resource_id` resolve to a kind the gateway cannot serve.
    pub fn insert_unknown_kind(&self, resource_id: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(resource_id.to_string(), Entry::UnknownKind);
    }

    pub fn remove(&self, resource_id: &str) {
        self.entries.lock().unwrap().remove(resource_id);
    }

    /// Fail every byte fetch with `status`.
    pub fn fail_fetches_with(&self, status: u16) {
        *self.fetch_failure.lock().unwrap() = Some(status);
    }

    /// Fail every locator resolution with a transport error.
    pub fn fail_locators(&self) {
        self.fail_locators.store(true, Ordering::SeqCst);
    }

    pub fn delay_metadata(&self, by: Duration) {
        *self.metadata_delay.lock().unwrap() = Some(by);
    }

    pub fn delay_locators(&self, by: Duration) {
        *self.locator_delay.lock().unwrap() = Some(by);
    }

    pub fn delay_fetches(&self, by: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(by);
    }

    /// Serve the first chunk of each body, then never finish.
    pub fn stall_bodies(&self) {
        self.stall_bodies.store(true, Ordering::SeqCst);
    }

    /// Whether a body handed out by `fetch_bytes` has been dropped.
    pub fn body_dropped(&self) -> bool {
        self.body_dropped.load(Ordering::SeqCst)
    }

    pub fn last_range(&self) -> Option<String> {
        self.last_range.lock().unwrap().clone()
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn locator_calls(&self) -> usize {
        self.locator_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.metadata_calls() + self.locator_calls() + self.fetch_calls()
    }
}

/// Sets its flag when the stream holding it is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn stalled(data: Bytes, dropped: Arc<AtomicBool>) -> ByteStream {
    let guard = DropFlag(dropped);
    let first = data.slice(..CHUNK_SIZE.min(data.len()));
    Box::pin(
        futures::stream::iter(vec![Ok(first)])
            .chain(futures::stream::pending())
            .map(move |chunk: UpstreamResult<Bytes>| {
                let _held = &guard;
                chunk
            }),
    )
}

async fn pause(delay: &Mutex<Option<Duration>>) {
    let delay = *delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn chunked(data: Bytes) -> ByteStream {
    let chunks: Vec<UpstreamResult<Bytes>> = (0..data.len())
        .step_by(CHUNK_SIZE)
        .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

#[async_trait]
impl UpstreamProvider for MockUpstream {
    async fn fetch_metadata(
        &self,
        _container_id: &str,
        resource_id: &str,
    ) -> UpstreamResult<ResourceKind> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        pause(&self.metadata_delay).await;
        let entry = self.entries.lock().unwrap().get(resource_id).cloned();
        match entry {
            Some(Entry::Object(kind)) => Ok(kind),
            Some(Entry::UnknownKind) => Err(UpstreamError::UnknownKind("sticker".to_string())),
            None => Err(UpstreamError::NotFound(resource_id.to_string())),
        }
    }

    async fn resolve_locator(&self, descriptor: &ResourceDescriptor) -> UpstreamResult<ByteLocator> {
        self.locator_calls.fetch_add(1, Ordering::SeqCst);
        pause(&self.locator_delay).await;
        if self.fail_locators.load(Ordering::SeqCst) {
            return Err(UpstreamError::Transport("injected locator failure".to_string()));
        }
        Ok(ByteLocator::new(descriptor.locator.clone()))
    }

    async fn fetch_bytes(
        &self,
        locator: &ByteLocator,
        range: Option<&str>,
    ) -> UpstreamResult<UpstreamResponse> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_range.lock().unwrap() = range.map(str::to_string);
        pause(&self.fetch_delay).await;

        if let Some(status) = *self.fetch_failure.lock().unwrap() {
            return Err(UpstreamError::Status {
                status,
                message: "injected failure".to_string(),
            });
        }

        let data = self
            .blobs
            .lock()
            .unwrap()
            .get(&locator.path)
            .cloned()
            .ok_or_else(|| UpstreamError::NotFound(locator.path.clone()))?;
        let total = data.len() as u64;

        if self.stall_bodies.load(Ordering::SeqCst) {
            return Ok(UpstreamResponse {
                status: 200,
                content_length: Some(total),
                content_range: None,
                body: stalled(data, self.body_dropped.clone()),
            });
        }

        let parsed = match range {
            Some(header) => parse_range(header, total).map_err(|_| UpstreamError::Status {
                status: 416,
                message: "range not satisfiable".to_string(),
            })?,
            None => None,
        };

        match parsed {
            Some(r) => Ok(UpstreamResponse {
                status: 206,
                content_length: Some(r.len()),
                content_range: Some(r.content_range(total)),
                body: chunked(data.slice(r.start as usize..=r.end as usize)),
            }),
            None => Ok(UpstreamResponse {
                status: 200,
                content_length: Some(total),
                content_range: None,
                body: chunked(data),
            }),
        }
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }

    async fn health_check(&self) -> UpstreamResult<()> {
        Ok(())
    }
}
