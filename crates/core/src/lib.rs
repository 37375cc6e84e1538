//! Core types shared by the filegate gateway crates.
//!
//! This crate defines:
//! - Application configuration
//! - Upstream resource kinds and descriptors
//! - Serve modes and their Content-Disposition mapping

pub mod config;
pub mod error;
pub mod resource;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use resource::{ResourceDescriptor, ResourceFile, ResourceKind, ServeMode};

/// Default nonce length in characters.
pub const DEFAULT_NONCE_LEN: usize = 12;

/// Default signature prefix length in characters.
pub const DEFAULT_SIGNATURE_LEN: usize = 32;

/// Unpadded URL-safe base64 length of an HMAC-SHA256 tag.
pub const MAX_SIGNATURE_LEN: usize = 43;

/// Streaming ceiling: 2 GiB
pub const DEFAULT_STREAM_CEILING: u64 = 2 * 1024 * 1024 * 1024;

/// Ingestion ceiling: 4 GiB
pub const DEFAULT_INGESTION_CEILING: u64 = 4 * 1024 * 1024 * 1024;
