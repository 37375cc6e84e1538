//! Upstream provider backends.

pub mod filesystem;
pub mod s3;
pub mod telegram;
