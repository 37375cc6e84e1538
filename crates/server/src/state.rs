//! Application state shared across handlers.

use crate::cache::MetadataCache;
use crate::policy::RoutingPolicy;
use crate::proxy::StreamingProxy;
use filegate_core::config::AppConfig;
use filegate_metadata::MetadataStore;
use filegate_signer::TokenCodec;
use filegate_upstream::UpstreamProvider;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Token codec.
    pub codec: Arc<TokenCodec>,
    /// Descriptor cache, shared with the policy.
    pub cache: Arc<MetadataCache>,
    /// Upstream provider.
    pub upstream: Arc<dyn UpstreamProvider>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    pub policy: Arc<RoutingPolicy>,
    pub proxy: Arc<StreamingProxy>,
}

impl AppState {
    /// Create application state with a cache sized from configuration.
    pub fn new(
        config: AppConfig,
        codec: TokenCodec,
        upstream: Arc<dyn UpstreamProvider>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let cache = Arc::new(MetadataCache::from_config(&config.cache));
        Self::with_cache(config, codec, upstream, metadata, cache)
    }

    /// Create application state around an existing cache.
    pub fn with_cache(
        config: AppConfig,
        codec: TokenCodec,
        upstream: Arc<dyn UpstreamProvider>,
        metadata: Arc<dyn MetadataStore>,
        cache: Arc<MetadataCache>,
    ) -> Self {
        let policy = Arc::new(RoutingPolicy::new(
            metadata.clone(),
            upstream.clone(),
            cache.clone(),
            config.upstream.container_id(),
            config.limits.stream_ceiling,
            config.timeouts.metadata(),
        ));
        let proxy = Arc::new(StreamingProxy::new(
            upstream.clone(),
            config.timeouts.locator(),
            config.timeouts.connect(),
            config.timeouts.idle(),
        ));

        Self {
            config: Arc::new(config),
            codec: Arc::new(codec),
            cache,
            upstream,
            metadata,
            policy,
            proxy,
        }
    }
}
