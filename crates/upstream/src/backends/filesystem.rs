//! Local filesystem upstream backend.
//!
//! Each resource is a blob file under the root, optionally accompanied by a
//! `<name>.meta.json` sidecar declaring its kind, display name and MIME type.
//!
//! Resource identifiers are blob file names. Tokens cannot carry a `.`, so
//! blobs must be stored under dot-free names (`report`, not `report.pdf`);
//! the client-facing name belongs in the sidecar's `display_name`.

use crate::error::{UpstreamError, UpstreamResult};
use crate::range::{Unsatisfiable, parse_range};
use crate::traits::{ByteLocator, UpstreamProvider, UpstreamResponse};
use async_trait::async_trait;
use bytes::Bytes;
use filegate_core::{ResourceDescriptor, ResourceFile, ResourceKind};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Suffix of sidecar metadata files.
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Sidecar metadata stored next to a blob.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Sidecar {
    /// One of document, audio, video, photo. Defaults to document.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Local filesystem upstream.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> UpstreamResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Write a blob and its sidecar. Used by tests and local tooling.
    pub async fn put(&self, resource_id: &str, data: &[u8], sidecar: &Sidecar) -> UpstreamResult<()> {
        let path = self.blob_path(resource_id).await?;
        fs::write(&path, data).await?;
        let meta = serde_json::to_vec_pretty(sidecar)
            .map_err(|e| UpstreamError::Decode(format!("failed to encode sidecar: {e}")))?;
        fs::write(sidecar_path(&path), meta).await?;
        Ok(())
    }

    /// Remove a blob and its sidecar.
    pub async fn remove(&self, resource_id: &str) -> UpstreamResult<()> {
        let path = self.blob_path(resource_id).await?;
        fs::remove_file(&path).await.map_err(|e| not_found_or_io(e, resource_id))?;
        match fs::remove_file(sidecar_path(&path)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Resolve a resource identifier to a path under the root.
    async fn blob_path(&self, resource_id: &str) -> UpstreamResult<PathBuf> {
        let root = self.root.clone();
        let resource_id = resource_id.to_string();
        tokio::task::spawn_blocking(move || blob_path_sync(&root, &resource_id))
            .await
            .map_err(|e| {
                UpstreamError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    async fn read_sidecar(path: &Path) -> UpstreamResult<Sidecar> {
        match fs::read(sidecar_path(path)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                UpstreamError::Decode(format!("invalid sidecar {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }
}

fn sidecar_path(blob: &Path) -> PathBuf {
    let mut name = blob.as_os_str().to_owned();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

fn not_found_or_io(err: std::io::Error, resource_id: &str) -> UpstreamError {
    if err.kind() == std::io::ErrorKind::NotFound {
        UpstreamError::NotFound(resource_id.to_string())
    } else {
        UpstreamError::Io(err)
    }
}

/// Reject identifiers that could escape the root, including through symlinks.
fn blob_path_sync(root: &Path, resource_id: &str) -> UpstreamResult<PathBuf> {
    if resource_id.is_empty() || resource_id.ends_with(SIDECAR_SUFFIX) {
        return Err(UpstreamError::InvalidKey(format!(
            "not a blob identifier: {resource_id}"
        )));
    }
    if !Path::new(resource_id)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(UpstreamError::InvalidKey(format!(
            "unsafe path component in {resource_id}"
        )));
    }

    let path = root.join(resource_id);
    if path.exists() {
        let root_canonical = root.canonicalize()?;
        let canonical = path.canonicalize()?;
        if !canonical.starts_with(&root_canonical) {
            return Err(UpstreamError::InvalidKey(format!(
                "resolved path escapes upstream root: {resource_id}"
            )));
        }
    }
    Ok(path)
}

#[async_trait]
impl UpstreamProvider for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn fetch_metadata(
        &self,
        _container_id: &str,
        resource_id: &str,
    ) -> UpstreamResult<ResourceKind> {
        let path = self.blob_path(resource_id).await?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(e, resource_id))?;
        if !meta.is_file() {
            return Err(UpstreamError::NotFound(resource_id.to_string()));
        }
        let sidecar = Self::read_sidecar(&path).await?;

        let file = ResourceFile {
            identifier: resource_id.to_string(),
            display_name: sidecar
                .display_name
                .unwrap_or_else(|| resource_id.rsplit('/').next().unwrap_or(resource_id).to_string()),
            mime_type: sidecar.mime_type.unwrap_or_default(),
            size: meta.len(),
        };

        match sidecar.kind.as_deref().unwrap_or("document") {
            "document" => Ok(ResourceKind::Document(file)),
            "audio" => Ok(ResourceKind::Audio(file)),
            "video" => Ok(ResourceKind::Video(file)),
            "photo" => Ok(ResourceKind::Photo(file)),
            other => Err(UpstreamError::UnknownKind(format!(
                "{resource_id} declares kind '{other}'"
            ))),
        }
    }

    #[instrument(skip(self, descriptor), fields(backend = "filesystem"))]
    async fn resolve_locator(&self, descriptor: &ResourceDescriptor) -> UpstreamResult<ByteLocator> {
        let path = self.blob_path(&descriptor.locator).await?;
        if !fs::try_exists(&path).await? {
            return Err(UpstreamError::NotFound(descriptor.locator.clone()));
        }
        Ok(ByteLocator::new(descriptor.locator.clone()))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn fetch_bytes(
        &self,
        locator: &ByteLocator,
        range: Option<&str>,
    ) -> UpstreamResult<UpstreamResponse> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let path = self.blob_path(&locator.path).await?;
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(e, &locator.path))?;
        let total = file.metadata().await?.len();

        let selected = match range.map(|r| parse_range(r, total)) {
            Some(Err(Unsatisfiable)) => {
                return Err(UpstreamError::Status {
                    status: 416,
                    message: format!("range not satisfiable for {total} bytes"),
                });
            }
            Some(Ok(selected)) => selected,
            None => None,
        };

        let (status, start, length, content_range) = match selected {
            Some(r) => (206, r.start, r.len(), Some(r.content_range(total))),
            None => (200, 0, total, None),
        };

        if start > 0 {
            file.seek(std::io::SeekFrom::Start(start)).await?;
        }

        let body = async_stream::try_stream! {
            let mut remaining = length;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            while remaining > 0 {
                let want = remaining.min(STREAM_CHUNK_SIZE as u64) as usize;
                let n = file.read(&mut buf[..want]).await?;
                if n == 0 {
                    break;
                }
                remaining -= n as u64;
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(UpstreamResponse {
            status,
            content_length: Some(length),
            content_range,
            body: Box::pin(body),
        })
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> UpstreamResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(UpstreamError::Config(format!(
                "upstream root {} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}
