//! Test fixtures for generating test data.

use bytes::Bytes;
use filegate_core::{ResourceFile, ResourceKind};

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Build a resource file description for a blob of `size` bytes.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn resource_file(identifier: &str, name: &str, mime: &str, size: u64) -> ResourceFile {
    ResourceFile {
        identifier: identifier.to_string(),
        display_name: name.to_string(),
        mime_type: mime.to_string(),
        size,
    }
}

#[allow(dead_code)]
pub fn video(identifier: &str, name: &str, size: u64) -> ResourceKind {
    ResourceKind::Video(resource_file(identifier, name, "video/mp4", size))
}

#[allow(dead_code)]
pub fn document(identifier: &str, name: &str, size: u64) -> ResourceKind {
    ResourceKind::Document(resource_file(identifier, name, "application/pdf", size))
}
