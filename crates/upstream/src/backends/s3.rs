//! S3-compatible upstream backend using AWS SDK.
//!
//! Resource identifiers are object keys. The resource kind comes from the
//! `kind` user metadata entry when present, otherwise from the content type.
//!
//! Tokens cannot carry a `.`, so linkable objects need dot-free keys
//! (`uploads/7f3a`, not `uploads/report.pdf`). The configured prefix is not
//! part of the identifier and may contain dots.

use crate::error::{UpstreamError, UpstreamResult};
use crate::traits::{ByteLocator, UpstreamProvider, UpstreamResponse};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use filegate_core::{ResourceDescriptor, ResourceFile, ResourceKind};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Tag carried by credential-chain errors so they surface as config errors.
const CREDENTIALS_ERROR_MARKER: &str = "filegate-s3-credentials";

/// User metadata key naming the resource kind.
const KIND_METADATA_KEY: &str = "kind";

/// User metadata key naming the download file name.
const FILENAME_METADATA_KEY: &str = "filename";

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the AWS default credentials chain on the first signed request,
/// keeping backend construction free of network and TLS setup.
#[derive(Debug)]
struct DeferredCredentials {
    region: String,
    chain: OnceCell<aws_config::default_provider::credentials::DefaultCredentialsChain>,
}

impl DeferredCredentials {
    fn new(region: String) -> Self {
        Self {
            region,
            chain: OnceCell::new(),
        }
    }

    async fn resolve(&self) -> aws_credential_types::provider::Result {
        let chain = self
            .chain
            .get_or_try_init(|| async {
                let region = aws_config::Region::new(self.region.clone());
                tokio::task::spawn(async move {
                    aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                        .region(region)
                        .build()
                        .await
                })
                .await
                .map_err(|e| {
                    CredentialsError::provider_error(format!(
                        "{CREDENTIALS_ERROR_MARKER}: credential chain setup failed: {e}"
                    ))
                })
            })
            .await?;

        chain.provide_credentials().await.map_err(|e| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_ERROR_MARKER}: no usable AWS credentials: {e}"
            ))
        })
    }
}

impl ProvideCredentials for DeferredCredentials {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.resolve())
    }
}

/// Accept bare `host:port` endpoints by assuming plain HTTP.
fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Map an SDK error for `key`: 404 is not-found, other service errors keep their status.
fn map_sdk_error<E>(err: SdkError<E>, key: &str) -> UpstreamError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if err.to_string().contains(CREDENTIALS_ERROR_MARKER) {
        return UpstreamError::Config(
            "S3 credentials unavailable; configure access keys or ambient AWS credentials"
                .to_string(),
        );
    }

    if let SdkError::ServiceError(service_err) = &err {
        let status = service_err.raw().status().as_u16();
        if status == 404 {
            return UpstreamError::NotFound(key.to_string());
        }
        return UpstreamError::Status {
            status,
            message: format!("S3 request for {key} failed"),
        };
    }
    if let SdkError::TimeoutError(_) = &err {
        return UpstreamError::Timeout(format!("S3 request for {key}"));
    }
    UpstreamError::S3(Box::new(err))
}

/// Classify an object from its user metadata and content type.
fn classify(key: &str, kind: Option<&str>, file: ResourceFile) -> UpstreamResult<ResourceKind> {
    match kind {
        Some("document") => Ok(ResourceKind::Document(file)),
        Some("audio") => Ok(ResourceKind::Audio(file)),
        Some("video") => Ok(ResourceKind::Video(file)),
        Some("photo") => Ok(ResourceKind::Photo(file)),
        Some(other) => Err(UpstreamError::UnknownKind(format!(
            "object {key} declares kind '{other}'"
        ))),
        None if file.mime_type.starts_with("audio/") => Ok(ResourceKind::Audio(file)),
        None if file.mime_type.starts_with("video/") => Ok(ResourceKind::Video(file)),
        None => Ok(ResourceKind::Document(file)),
    }
}

/// S3-compatible upstream.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    endpoint: Option<String>,
    region: String,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// `force_path_style` selects `endpoint/bucket/key` URLs, which MinIO needs.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> UpstreamResult<Self> {
        let region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()))
            .force_path_style(force_path_style);

        builder = match (access_key_id, secret_access_key) {
            (Some(key_id), Some(secret)) => builder.credentials_provider(
                aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "filegate-config"),
            ),
            (None, None) => builder.credentials_provider(DeferredCredentials::new(region.clone())),
            _ => {
                return Err(UpstreamError::Config(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ));
            }
        };

        let endpoint = endpoint.as_deref().map(normalize_endpoint);
        if let Some(url) = &endpoint {
            builder = builder.endpoint_url(url);
            // Plain-HTTP endpoints skip the TLS-capable default client.
            if url.to_ascii_lowercase().starts_with("http://") {
                builder = builder.http_client(SmithyHttpClientBuilder::new().build_http());
            }
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            prefix: prefix.map(|p| p.trim_end_matches('/').to_string()),
            endpoint,
            region,
        })
    }

    /// Object key for a resource identifier (applies prefix if configured).
    fn full_key(&self, resource_id: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{resource_id}"),
            None => resource_id.to_string(),
        }
    }

    fn display_name(key: &str) -> String {
        key.rsplit('/').next().unwrap_or(key).to_string()
    }
}

#[async_trait]
impl UpstreamProvider for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn fetch_metadata(
        &self,
        _container_id: &str,
        resource_id: &str,
    ) -> UpstreamResult<ResourceKind> {
        let key = self.full_key(resource_id);
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, resource_id))?;

        let metadata = output.metadata();
        let kind = metadata
            .and_then(|m| m.get(KIND_METADATA_KEY))
            .map(String::as_str);
        let display_name = metadata
            .and_then(|m| m.get(FILENAME_METADATA_KEY))
            .cloned()
            .unwrap_or_else(|| Self::display_name(&key));

        let file = ResourceFile {
            identifier: resource_id.to_string(),
            display_name,
            mime_type: output.content_type().unwrap_or_default().to_string(),
            size: output.content_length().unwrap_or(0).max(0) as u64,
        };
        classify(resource_id, kind, file)
    }

    #[instrument(skip(self, descriptor), fields(backend = "s3"))]
    async fn resolve_locator(&self, descriptor: &ResourceDescriptor) -> UpstreamResult<ByteLocator> {
        // Confirms the object still exists; keys themselves never expire.
        let key = self.full_key(&descriptor.locator);
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &descriptor.locator))?;
        Ok(ByteLocator::new(key))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn fetch_bytes(
        &self,
        locator: &ByteLocator,
        range: Option<&str>,
    ) -> UpstreamResult<UpstreamResponse> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&locator.path)
            .set_range(range.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &locator.path))?;

        let content_range = output.content_range().map(str::to_string);
        let content_length = output.content_length().and_then(|l| u64::try_from(l).ok());
        let status = if content_range.is_some() { 206 } else { 200 };

        let body = ReaderStream::new(output.body.into_async_read())
            .map(|chunk| chunk.map_err(UpstreamError::Io));

        Ok(UpstreamResponse {
            status,
            content_length,
            content_range,
            body: Box::pin(body),
        })
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> UpstreamResult<()> {
        let probe = self.client.head_bucket().bucket(&self.bucket).send();
        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe)
            .await
            .map_err(|_| UpstreamError::Timeout("S3 health check".to_string()))?
            .map_err(|e| map_sdk_error(e, &self.bucket))?;
        Ok(())
    }
}
