//! User repository.

use crate::error::MetadataResult;
use crate::models::UserRow;
use async_trait::async_trait;

/// Repository for publishing users.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a user or refresh their names, counting one more published file.
    async fn register_user(&self, user: &UserRow) -> MetadataResult<()>;

    /// Get a user by ID.
    async fn get_user(&self, user_id: &str) -> MetadataResult<Option<UserRow>>;
}
