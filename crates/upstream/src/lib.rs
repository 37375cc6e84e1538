//! Upstream blob providers for the filegate gateway.
//!
//! This crate provides:
//! - The `UpstreamProvider` abstraction (metadata, locator, byte fetch)
//! - Backends: Telegram Bot API, S3-compatible, and local filesystem

pub mod backends;
pub mod error;
pub mod range;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend, telegram::TelegramBackend};
pub use error::{UpstreamError, UpstreamResult};
pub use traits::{ByteLocator, ByteStream, UpstreamProvider, UpstreamResponse};

use filegate_core::config::UpstreamConfig;
use std::sync::Arc;

/// Create an upstream provider from configuration.
pub async fn from_config(config: &UpstreamConfig) -> UpstreamResult<Arc<dyn UpstreamProvider>> {
    config.validate().map_err(UpstreamError::Config)?;

    match config {
        UpstreamConfig::Telegram {
            bot_token,
            api_base,
            ..
        } => {
            let backend = TelegramBackend::new(bot_token, api_base)?;
            Ok(Arc::new(backend))
        }
        UpstreamConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
        UpstreamConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = UpstreamConfig::Filesystem {
            path: temp.path().join("blobs"),
        };
        let upstream = from_config(&config).await.unwrap();
        assert_eq!(upstream.backend_name(), "filesystem");
        upstream.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn from_config_telegram_ok() {
        let config = UpstreamConfig::Telegram {
            bot_token: "123:abc".to_string(),
            container_id: "-1001".to_string(),
            api_base: "http://127.0.0.1:1".to_string(),
        };
        let upstream = from_config(&config).await.unwrap();
        assert_eq!(upstream.backend_name(), "telegram");
    }

    #[tokio::test]
    async fn from_config_rejects_invalid_s3_credentials() {
        let config = UpstreamConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("key".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        let err = match from_config(&config).await {
            Ok(_) => panic!("expected config error"),
            Err(err) => err,
        };
        assert!(matches!(err, UpstreamError::Config(_)));
    }
}
