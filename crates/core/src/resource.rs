//! Resource model: upstream object kinds, descriptors and serve modes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// MIME type used when the provider does not report one.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// MIME type for photo resources.
pub const PHOTO_MIME_TYPE: &str = "image/jpeg";

/// Fields every resource kind carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFile {
    /// Provider handle used to resolve a byte locator.
    pub identifier: String,
    /// File name shown to clients.
    pub display_name: String,
    /// MIME type as stored.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
}

/// Kind of object the upstream holds for a resource identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceKind {
    Document(ResourceFile),
    Audio(ResourceFile),
    Video(ResourceFile),
    Photo(ResourceFile),
}

impl ResourceKind {
    pub fn file(&self) -> &ResourceFile {
        match self {
            ResourceKind::Document(file)
            | ResourceKind::Audio(file)
            | ResourceKind::Video(file)
            | ResourceKind::Photo(file) => file,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Document(_) => "document",
            ResourceKind::Audio(_) => "audio",
            ResourceKind::Video(_) => "video",
            ResourceKind::Photo(_) => "photo",
        }
    }

    /// Collapse into the descriptor the routing policy and proxy work with.
    pub fn into_descriptor(self) -> ResourceDescriptor {
        let (file, forced_mime) = match self {
            ResourceKind::Photo(file) => (file, Some(PHOTO_MIME_TYPE)),
            ResourceKind::Document(file) | ResourceKind::Audio(file) | ResourceKind::Video(file) => {
                (file, None)
            }
        };

        let mime_type = match forced_mime {
            Some(mime) => mime.to_string(),
            None if file.mime_type.is_empty() => FALLBACK_MIME_TYPE.to_string(),
            None => file.mime_type,
        };

        ResourceDescriptor {
            size: file.size,
            mime_type,
            locator: file.identifier,
            display_name: file.display_name,
        }
    }
}

/// Resolved object metadata. Immutable once fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Size in bytes.
    pub size: u64,
    /// MIME type served to clients.
    pub mime_type: String,
    /// Opaque upstream path from which a short-lived byte locator is resolved.
    pub locator: String,
    /// File name for Content-Disposition.
    pub display_name: String,
}

/// How the client asked for the bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    #[default]
    Attachment,
    Inline,
    Stream,
}

impl ServeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServeMode::Attachment => "attachment",
            ServeMode::Inline => "inline",
            ServeMode::Stream => "stream",
        }
    }

    /// Content-Disposition type: stream is served inline.
    pub fn disposition(&self) -> &'static str {
        match self {
            ServeMode::Attachment => "attachment",
            ServeMode::Inline | ServeMode::Stream => "inline",
        }
    }

    /// Whether the streaming ceiling applies to this mode.
    pub fn is_size_gated(&self) -> bool {
        matches!(self, ServeMode::Attachment | ServeMode::Inline)
    }
}

impl FromStr for ServeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "attachment" => Ok(ServeMode::Attachment),
            "inline" => Ok(ServeMode::Inline),
            "stream" => Ok(ServeMode::Stream),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for ServeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime: &str) -> ResourceFile {
        ResourceFile {
            identifier: "file-id".to_string(),
            display_name: "movie.mkv".to_string(),
            mime_type: mime.to_string(),
            size: 42,
        }
    }

    #[test]
    fn test_document_descriptor_keeps_mime() {
        let descriptor = ResourceKind::Document(file("application/pdf")).into_descriptor();
        assert_eq!(descriptor.mime_type, "application/pdf");
        assert_eq!(descriptor.locator, "file-id");
        assert_eq!(descriptor.display_name, "movie.mkv");
        assert_eq!(descriptor.size, 42);
    }

    #[test]
    fn test_missing_mime_falls_back() {
        let descriptor = ResourceKind::Audio(file("")).into_descriptor();
        assert_eq!(descriptor.mime_type, FALLBACK_MIME_TYPE);
    }

    #[test]
    fn test_photo_is_always_jpeg() {
        let descriptor = ResourceKind::Photo(file("image/png")).into_descriptor();
        assert_eq!(descriptor.mime_type, PHOTO_MIME_TYPE);
    }

    #[test]
    fn test_serve_mode_parse() {
        assert_eq!("attachment".parse::<ServeMode>().unwrap(), ServeMode::Attachment);
        assert_eq!("inline".parse::<ServeMode>().unwrap(), ServeMode::Inline);
        assert_eq!("stream".parse::<ServeMode>().unwrap(), ServeMode::Stream);
        assert!(matches!(
            "Inline".parse::<ServeMode>(),
            Err(Error::InvalidMode(ref m)) if m == "Inline"
        ));
    }

    #[test]
    fn test_serve_mode_disposition_and_gating() {
        assert_eq!(ServeMode::Stream.disposition(), "inline");
        assert_eq!(ServeMode::Attachment.disposition(), "attachment");
        assert!(ServeMode::Inline.is_size_gated());
        assert!(ServeMode::Attachment.is_size_gated());
        assert!(!ServeMode::Stream.is_size_gated());
    }
}
