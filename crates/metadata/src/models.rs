//! Database models mapping to the metadata schema.

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// A published upload. `message_id` is the upstream resource identifier
/// embedded in issued tokens.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub file_id: String,
    pub message_id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub file_name: Option<String>,
    pub file_size: i64,
    pub file_type: Option<String>,
    pub secret_token: String,
    pub created_at: OffsetDateTime,
    pub downloads: i64,
}

/// A user who published at least one file.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub first_used: OffsetDateTime,
    pub total_files: i64,
    pub last_activity: OffsetDateTime,
}

/// Aggregate counters across all records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_files: u64,
    pub total_users: u64,
    pub total_downloads: u64,
    pub total_bytes: u64,
}
