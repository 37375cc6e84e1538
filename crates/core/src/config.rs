//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public base URL used when printing links (e.g., "https://files.example.com").
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: default_public_base_url(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Upstream provider configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UpstreamConfig {
    /// Telegram Bot API. Resources are message ids inside a channel.
    Telegram {
        /// Bot token issued by BotFather.
        /// WARNING: Prefer FILEGATE_UPSTREAM__BOT_TOKEN over storing it in config files.
        bot_token: String,
        /// Channel (chat) id holding the uploaded messages.
        container_id: String,
        /// API base URL.
        #[serde(default = "default_telegram_api_base")]
        api_base: String,
    },
    /// S3-compatible bucket. Resources are object keys.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs. Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
    /// Local directory. Resources are file names with a `.meta.json` sidecar.
    Filesystem {
        /// Root directory.
        path: PathBuf,
    },
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/blobs"),
        }
    }
}

impl UpstreamConfig {
    /// Identifier of the container resources live in, used as the cache key prefix.
    pub fn container_id(&self) -> String {
        match self {
            UpstreamConfig::Telegram { container_id, .. } => container_id.clone(),
            UpstreamConfig::S3 { bucket, .. } => bucket.clone(),
            UpstreamConfig::Filesystem { path } => path.display().to_string(),
        }
    }

    /// Short provider name for logs and health output.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamConfig::Telegram { .. } => "telegram",
            UpstreamConfig::S3 { .. } => "s3",
            UpstreamConfig::Filesystem { .. } => "filesystem",
        }
    }

    /// Validate upstream configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            UpstreamConfig::Telegram {
                bot_token,
                container_id,
                api_base,
            } => {
                if bot_token.trim().is_empty() {
                    return Err("upstream.bot_token must not be empty".to_string());
                }
                if container_id.trim().is_empty() {
                    return Err("upstream.container_id must not be empty".to_string());
                }
                if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
                    return Err(format!(
                        "upstream.api_base must be an http(s) URL, got '{api_base}'"
                    ));
                }
                Ok(())
            }
            UpstreamConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            UpstreamConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only, slow queries are logged).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Token codec configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Shared secret source.
    #[serde(default)]
    pub secret: SecretConfig,
    /// Nonce length in characters.
    #[serde(default = "default_nonce_len")]
    pub nonce_len: usize,
    /// Length of the embedded signature prefix.
    #[serde(default = "default_signature_len")]
    pub signature_len: usize,
}

fn default_nonce_len() -> usize {
    crate::DEFAULT_NONCE_LEN
}

fn default_signature_len() -> usize {
    crate::DEFAULT_SIGNATURE_LEN
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: SecretConfig::default(),
            nonce_len: default_nonce_len(),
            signature_len: default_signature_len(),
        }
    }
}

impl TokenConfig {
    /// Validate token configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.nonce_len == 0 {
            return Err("token.nonce_len must be at least 1".to_string());
        }
        if self.signature_len == 0 || self.signature_len > crate::MAX_SIGNATURE_LEN {
            return Err(format!(
                "token.signature_len must be between 1 and {}, got {}",
                crate::MAX_SIGNATURE_LEN,
                self.signature_len
            ));
        }
        Ok(())
    }
}

/// Shared secret source configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SecretConfig {
    /// Secret stored in a file.
    File {
        /// Path to the secret file.
        path: PathBuf,
    },
    /// Secret stored in an environment variable.
    Env {
        /// Environment variable name.
        var: String,
    },
    /// Secret provided directly as a value (NOT recommended for production).
    Value {
        /// The secret.
        secret: String,
    },
    /// Generate a random secret at startup (links die on restart).
    #[default]
    Generate,
}

/// Metadata cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum number of entries before the oldest insertion is evicted.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_capacity() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            capacity: default_cache_capacity(),
        }
    }
}

impl CacheConfig {
    /// Get the TTL as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Validate cache configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("cache.capacity must be at least 1".to_string());
        }
        if self.ttl_secs == 0 {
            return Err("cache.ttl_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Size ceilings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest object served through the byte proxy in inline/attachment mode.
    #[serde(default = "default_stream_ceiling")]
    pub stream_ceiling: u64,
    /// Largest object accepted at upload time.
    #[serde(default = "default_ingestion_ceiling")]
    pub ingestion_ceiling: u64,
}

fn default_stream_ceiling() -> u64 {
    crate::DEFAULT_STREAM_CEILING
}

fn default_ingestion_ceiling() -> u64 {
    crate::DEFAULT_INGESTION_CEILING
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            stream_ceiling: default_stream_ceiling(),
            ingestion_ceiling: default_ingestion_ceiling(),
        }
    }
}

impl LimitsConfig {
    /// Validate ceiling ordering.
    pub fn validate(&self) -> Result<(), String> {
        if self.stream_ceiling > self.ingestion_ceiling {
            return Err(format!(
                "limits.stream_ceiling ({}) must not exceed limits.ingestion_ceiling ({})",
                self.stream_ceiling, self.ingestion_ceiling
            ));
        }
        Ok(())
    }
}

/// Per-stage upstream timeouts, in seconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Upstream metadata fetch.
    #[serde(default = "default_metadata_secs")]
    pub metadata_secs: u64,
    /// Upstream locator resolution.
    #[serde(default = "default_locator_secs")]
    pub locator_secs: u64,
    /// Until the upstream byte response headers arrive.
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    /// Maximum wait between two body chunks.
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
}

fn default_metadata_secs() -> u64 {
    10
}

fn default_locator_secs() -> u64 {
    10
}

fn default_connect_secs() -> u64 {
    30
}

fn default_idle_secs() -> u64 {
    60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            metadata_secs: default_metadata_secs(),
            locator_secs: default_locator_secs(),
            connect_secs: default_connect_secs(),
            idle_secs: default_idle_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn metadata(&self) -> Duration {
        Duration::from_secs(self.metadata_secs)
    }

    pub fn locator(&self) -> Duration {
        Duration::from_secs(self.locator_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    /// Reject zero timeouts, which would fail every request.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("metadata_secs", self.metadata_secs),
            ("locator_secs", self.locator_secs),
            ("connect_secs", self.connect_secs),
            ("idle_secs", self.idle_secs),
        ] {
            if value == 0 {
                return Err(format!("timeouts.{name} must be at least 1"));
            }
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream provider configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Token codec configuration.
    #[serde(default)]
    pub token: TokenConfig,
    /// Metadata cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Size ceilings.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Upstream timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem upstream, SQLite metadata,
    /// and a fixed token secret.
    pub fn for_testing() -> Self {
        Self {
            token: TokenConfig {
                secret: SecretConfig::Value {
                    secret: "test-secret-0123456789abcdef".to_string(),
                },
                ..TokenConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.upstream.validate()?;
        self.token.validate()?;
        self.cache.validate()?;
        self.limits.validate()?;
        self.timeouts.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_gateway_constants() {
        let config = AppConfig::default();
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.limits.stream_ceiling, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.limits.ingestion_ceiling, 4 * 1024 * 1024 * 1024);
        assert_eq!(config.token.nonce_len, 12);
        assert_eq!(config.token.signature_len, 32);
        assert!(config.server.metrics_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_telegram_config_deserialize_with_default_api_base() {
        let json = r#"{"type":"telegram","bot_token":"123:abc","container_id":"-1001"}"#;
        let config: UpstreamConfig = serde_json::from_str(json).unwrap();

        match &config {
            UpstreamConfig::Telegram { api_base, .. } => {
                assert_eq!(api_base, "https://api.telegram.org");
            }
            _ => panic!("expected telegram config"),
        }
        assert_eq!(config.container_id(), "-1001");
        assert_eq!(config.kind(), "telegram");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_telegram_config_rejects_empty_token() {
        let config = UpstreamConfig::Telegram {
            bot_token: "  ".to_string(),
            container_id: "-1001".to_string(),
            api_base: default_telegram_api_base(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_s3_config_validate_partial_credentials() {
        let invalid = UpstreamConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access-key".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(invalid.validate().is_err());

        let valid = UpstreamConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access-key".to_string()),
            secret_access_key: Some("secret-key".to_string()),
            force_path_style: false,
        };
        assert!(valid.validate().is_ok());
        assert_eq!(valid.container_id(), "bucket");
    }

    #[test]
    fn test_token_config_rejects_oversized_signature() {
        let config = TokenConfig {
            signature_len: crate::MAX_SIGNATURE_LEN + 1,
            ..TokenConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limits_reject_inverted_ceilings() {
        let limits = LimitsConfig {
            stream_ceiling: 10,
            ingestion_ceiling: 5,
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_secret_config_tagged_variants() {
        let json = r#"{"type":"env","var":"FILEGATE_SECRET"}"#;
        let config: SecretConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config, SecretConfig::Env { ref var } if var == "FILEGATE_SECRET"));

        let json = r#"{"type":"generate"}"#;
        let config: SecretConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config, SecretConfig::Generate));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"cache":{"ttl_secs":60},"timeouts":{"idle_secs":5}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.timeouts.idle(), Duration::from_secs(5));
        assert_eq!(config.timeouts.metadata_secs, 10);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = TimeoutConfig {
            connect_secs: 0,
            ..TimeoutConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("connect_secs"));
    }
}
