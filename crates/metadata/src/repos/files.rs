//! File record repository.

use crate::error::MetadataResult;
use crate::models::{FileRow, StoreStats};
use async_trait::async_trait;

/// Repository for published file records.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a record. Fails with `AlreadyExists` on a duplicate id or message.
    async fn create_file(&self, file: &FileRow) -> MetadataResult<()>;

    /// Find a record by resource identifier.
    async fn get_file(&self, message_id: &str) -> MetadataResult<Option<FileRow>>;

    /// Find a record by the token issued for it.
    async fn get_file_by_token(&self, secret_token: &str) -> MetadataResult<Option<FileRow>>;

    /// Whether a record exists for the resource identifier.
    async fn file_exists(&self, message_id: &str) -> MetadataResult<bool>;

    /// Delete a record, revoking every token issued for it. Returns whether a row was removed.
    async fn delete_file(&self, message_id: &str) -> MetadataResult<bool>;

    /// Delete every record. Returns the number removed.
    async fn delete_all_files(&self) -> MetadataResult<u64>;

    /// Bump the download counter.
    async fn increment_downloads(&self, message_id: &str) -> MetadataResult<()>;

    /// Most recent records for a user, newest first.
    async fn list_user_files(&self, user_id: &str, limit: u32) -> MetadataResult<Vec<FileRow>>;

    /// Aggregate counters.
    async fn stats(&self) -> MetadataResult<StoreStats>;
}
