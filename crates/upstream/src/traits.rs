//! Upstream provider trait definitions.

use crate::error::UpstreamResult;
use async_trait::async_trait;
use bytes::Bytes;
use filegate_core::{ResourceDescriptor, ResourceKind};
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = UpstreamResult<Bytes>> + Send>>;

/// Short-lived handle for one byte fetch. Never cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ByteLocator {
    pub path: String,
}

impl ByteLocator {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Successful (2xx) byte response from the upstream.
pub struct UpstreamResponse {
    /// 200 or 206.
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    pub body: ByteStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// Remote blob provider the gateway fronts.
#[async_trait]
pub trait UpstreamProvider: Send + Sync + 'static {
    /// Look up what the upstream holds for `resource_id` inside `container_id`.
    async fn fetch_metadata(
        &self,
        container_id: &str,
        resource_id: &str,
    ) -> UpstreamResult<ResourceKind>;

    /// Resolve a fresh byte locator for a previously described resource.
    async fn resolve_locator(&self, descriptor: &ResourceDescriptor) -> UpstreamResult<ByteLocator>;

    /// Fetch bytes, forwarding `range` verbatim. Non-2xx responses are errors.
    async fn fetch_bytes(
        &self,
        locator: &ByteLocator,
        range: Option<&str>,
    ) -> UpstreamResult<UpstreamResponse>;

    /// Backend name for logging and health output.
    fn backend_name(&self) -> &'static str;

    /// Verify the upstream is reachable with the configured credentials.
    async fn health_check(&self) -> UpstreamResult<()>;
}
