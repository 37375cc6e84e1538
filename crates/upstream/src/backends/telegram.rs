//! Telegram Bot API backend.
//!
//! Resources are channel messages. Metadata is read by re-captioning the
//! message (the only Bot API call that returns an arbitrary channel message),
//! locators come from `getFile`, and bytes from the bot file host.

use crate::error::{UpstreamError, UpstreamResult};
use crate::traits::{ByteLocator, UpstreamProvider, UpstreamResponse};
use async_trait::async_trait;
use filegate_core::{ResourceDescriptor, ResourceFile, ResourceKind};
use futures::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use uuid::Uuid;

/// Bot API envelope: `{ok, result}` or `{ok: false, error_code, description}`.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Message {
    document: Option<FileObject>,
    audio: Option<FileObject>,
    video: Option<FileObject>,
    photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    file_id: String,
    file_unique_id: String,
    file_name: Option<String>,
    mime_type: Option<String>,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
    file_unique_id: String,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

impl FileObject {
    fn into_file(self) -> ResourceFile {
        ResourceFile {
            display_name: self.file_name.unwrap_or(self.file_unique_id),
            identifier: self.file_id,
            mime_type: self.mime_type.unwrap_or_default(),
            size: self.file_size.unwrap_or(0),
        }
    }
}

impl Message {
    fn into_kind(self, message_id: &str) -> UpstreamResult<ResourceKind> {
        if let Some(document) = self.document {
            return Ok(ResourceKind::Document(document.into_file()));
        }
        if let Some(audio) = self.audio {
            return Ok(ResourceKind::Audio(audio.into_file()));
        }
        if let Some(video) = self.video {
            return Ok(ResourceKind::Video(video.into_file()));
        }
        // Photos arrive as ascending sizes; the last one is the original.
        if let Some(largest) = self.photo.and_then(|mut sizes| sizes.pop()) {
            return Ok(ResourceKind::Photo(ResourceFile {
                display_name: format!("{}.jpg", largest.file_unique_id),
                identifier: largest.file_id,
                mime_type: filegate_core::resource::PHOTO_MIME_TYPE.to_string(),
                size: largest.file_size.unwrap_or(0),
            }));
        }
        Err(UpstreamError::UnknownKind(format!(
            "message {message_id} carries no document, audio, video or photo"
        )))
    }
}

/// Telegram Bot API upstream.
pub struct TelegramBackend {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl std::fmt::Debug for TelegramBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBackend")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl TelegramBackend {
    /// Create a new Telegram backend.
    pub fn new(bot_token: &str, api_base: &str) -> UpstreamResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("filegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_base,
            self.bot_token,
            file_path.trim_start_matches('/')
        )
    }

    /// Call a Bot API method and unwrap its envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
        subject: &str,
    ) -> UpstreamResult<T> {
        let response = self
            .http
            .get(self.method_url(method))
            .query(params)
            .send()
            .await?;
        let http_status = response.status().as_u16();
        let envelope: ApiResponse<T> = response.json().await?;

        if envelope.ok {
            return envelope.result.ok_or_else(|| {
                UpstreamError::Decode(format!("{method} returned ok without a result"))
            });
        }

        let status = envelope.error_code.unwrap_or(http_status);
        let message = envelope
            .description
            .unwrap_or_else(|| format!("{method} failed"));
        Err(map_api_error(status, message, subject))
    }
}

/// Bot API reports missing messages and files as 400 with a descriptive text.
fn map_api_error(status: u16, message: String, subject: &str) -> UpstreamError {
    let lower = message.to_ascii_lowercase();
    if status == 404
        || lower.contains("not found")
        || lower.contains("message_id_invalid")
        || lower.contains("wrong file_id")
    {
        return UpstreamError::NotFound(subject.to_string());
    }
    UpstreamError::Status { status, message }
}

#[async_trait]
impl UpstreamProvider for TelegramBackend {
    #[instrument(skip(self), fields(backend = "telegram"))]
    async fn fetch_metadata(
        &self,
        container_id: &str,
        resource_id: &str,
    ) -> UpstreamResult<ResourceKind> {
        let caption = Uuid::new_v4().to_string();
        let message: Message = self
            .call(
                "editMessageCaption",
                &[
                    ("chat_id", container_id),
                    ("message_id", resource_id),
                    ("caption", caption.as_str()),
                ],
                resource_id,
            )
            .await?;
        message.into_kind(resource_id)
    }

    #[instrument(skip(self, descriptor), fields(backend = "telegram"))]
    async fn resolve_locator(&self, descriptor: &ResourceDescriptor) -> UpstreamResult<ByteLocator> {
        let file: File = self
            .call(
                "getFile",
                &[("file_id", descriptor.locator.as_str())],
                &descriptor.display_name,
            )
            .await?;
        let path = file.file_path.ok_or_else(|| UpstreamError::Status {
            status: 502,
            message: "getFile returned no file_path".to_string(),
        })?;
        Ok(ByteLocator::new(path))
    }

    #[instrument(skip(self, locator), fields(backend = "telegram"))]
    async fn fetch_bytes(
        &self,
        locator: &ByteLocator,
        range: Option<&str>,
    ) -> UpstreamResult<UpstreamResponse> {
        let mut request = self.http.get(self.file_url(&locator.path));
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes_stream().map_err(UpstreamError::from);

        Ok(UpstreamResponse {
            status: status.as_u16(),
            content_length,
            content_range,
            body: Box::pin(body),
        })
    }

    fn backend_name(&self) -> &'static str {
        "telegram"
    }

    #[instrument(skip(self), fields(backend = "telegram"))]
    async fn health_check(&self) -> UpstreamResult<()> {
        let _: serde_json::Value = self.call("getMe", &[], "getMe").await?;
        Ok(())
    }
}
