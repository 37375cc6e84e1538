//! Existence, descriptor and size checks that decide whether a resource may be served.

use crate::cache::MetadataCache;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use filegate_core::{ResourceDescriptor, ServeMode};
use filegate_metadata::MetadataStore;
use filegate_upstream::UpstreamProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of the size gate for one request. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingDecision {
    pub mode: ServeMode,
    pub allowed: bool,
    pub reason: Option<String>,
}

impl RoutingDecision {
    /// Apply the streaming ceiling to inline and attachment requests.
    pub fn evaluate(mode: ServeMode, size: u64, ceiling: u64) -> Self {
        if mode.is_size_gated() && size > ceiling {
            Self {
                mode,
                allowed: false,
                reason: Some(format!(
                    "{size} bytes exceeds the {ceiling} byte limit for {mode} mode"
                )),
            }
        } else {
            Self {
                mode,
                allowed: true,
                reason: None,
            }
        }
    }
}

/// An allowed request together with the descriptor it will be served from.
#[derive(Clone, Debug)]
pub struct Routed {
    pub decision: RoutingDecision,
    pub descriptor: ResourceDescriptor,
}

/// Decides whether a decoded resource may be served and in which mode.
pub struct RoutingPolicy {
    metadata: Arc<dyn MetadataStore>,
    upstream: Arc<dyn UpstreamProvider>,
    cache: Arc<MetadataCache>,
    container_id: String,
    stream_ceiling: u64,
    metadata_timeout: Duration,
}

impl RoutingPolicy {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        upstream: Arc<dyn UpstreamProvider>,
        cache: Arc<MetadataCache>,
        container_id: impl Into<String>,
        stream_ceiling: u64,
        metadata_timeout: Duration,
    ) -> Self {
        Self {
            metadata,
            upstream,
            cache,
            container_id: container_id.into(),
            stream_ceiling,
            metadata_timeout,
        }
    }

    pub fn stream_ceiling(&self) -> u64 {
        self.stream_ceiling
    }

    /// Validate the mode, confirm the record exists, resolve the descriptor
    /// and apply the size gate, in that order.
    pub async fn route(&self, resource_id: &str, mode: &str) -> ApiResult<Routed> {
        let mode: ServeMode = mode.parse()?;

        if !self.metadata.file_exists(resource_id).await? {
            return Err(ApiError::ResourceNotFound(format!(
                "no record for resource {resource_id}"
            )));
        }

        let descriptor = self.resolve_descriptor(resource_id).await?;

        let decision = RoutingDecision::evaluate(mode, descriptor.size, self.stream_ceiling);
        if !decision.allowed {
            tracing::info!(
                resource_id,
                size = descriptor.size,
                ceiling = self.stream_ceiling,
                mode = %mode,
                "rejecting oversized resource"
            );
            return Err(ApiError::PayloadTooLarge {
                size: descriptor.size,
                ceiling: self.stream_ceiling,
            });
        }

        Ok(Routed {
            decision,
            descriptor,
        })
    }

    /// Cached descriptor, or a fresh upstream lookup that populates the cache on success.
    pub async fn resolve_descriptor(&self, resource_id: &str) -> ApiResult<ResourceDescriptor> {
        if let Some(descriptor) = self.cache.get(&self.container_id, resource_id) {
            metrics::CACHE_HITS.inc();
            return Ok(descriptor);
        }
        metrics::CACHE_MISSES.inc();

        let started = Instant::now();
        let fetched = tokio::time::timeout(
            self.metadata_timeout,
            self.upstream.fetch_metadata(&self.container_id, resource_id),
        )
        .await;
        metrics::UPSTREAM_DURATION
            .with_label_values(&["metadata"])
            .observe(started.elapsed().as_secs_f64());

        let kind = match fetched {
            Ok(Ok(kind)) => kind,
            Ok(Err(e)) => {
                metrics::record_upstream_error("metadata");
                tracing::warn!(resource_id, error = %e, "upstream metadata lookup failed");
                return Err(e.into());
            }
            Err(_) => {
                metrics::record_upstream_error("metadata");
                tracing::warn!(
                    resource_id,
                    timeout_secs = self.metadata_timeout.as_secs(),
                    "upstream metadata lookup timed out"
                );
                return Err(ApiError::UpstreamUnavailable {
                    status: None,
                    message: "metadata lookup timed out".to_string(),
                });
            }
        };

        tracing::debug!(resource_id, kind = kind.as_str(), "resolved resource metadata");
        let descriptor = kind.into_descriptor();
        self.cache
            .put(&self.container_id, resource_id, descriptor.clone());
        metrics::CACHE_ENTRIES.set(self.cache.len() as i64);
        Ok(descriptor)
    }
}
