//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{FileRepo, UserRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Default advisory query timeout.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRepo + UserRepo + Send + Sync {
    /// Create tables and indexes if missing.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite store and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // Single writer connection avoids "database is locked" under concurrent handlers.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout: Duration::from_secs(
                query_timeout_secs.unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
            ),
        };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "opened sqlite metadata store");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// SQLite cannot cancel statements, so the timeout only flags slow queries.
    fn observe(&self, operation: &'static str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.query_timeout.as_millis() as u64,
                "metadata query exceeded timeout"
            );
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::{FileRow, StoreStats, UserRow};

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn create_file(&self, file: &FileRow) -> MetadataResult<()> {
            let started = Instant::now();
            let result = sqlx::query(
                r#"
                INSERT INTO files (
                    file_id, message_id, user_id, username, file_name,
                    file_size, file_type, secret_token, created_at, downloads
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&file.file_id)
            .bind(&file.message_id)
            .bind(&file.user_id)
            .bind(&file.username)
            .bind(&file.file_name)
            .bind(file.file_size)
            .bind(&file.file_type)
            .bind(&file.secret_token)
            .bind(file.created_at)
            .bind(file.downloads)
            .execute(&self.pool)
            .await;
            self.observe("create_file", started);

            result
                .map(|_| ())
                .map_err(|e| MetadataError::from_insert(e, &format!("file {}", file.message_id)))
        }

        async fn get_file(&self, message_id: &str) -> MetadataResult<Option<FileRow>> {
            let started = Instant::now();
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE message_id = ?")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;
            self.observe("get_file", started);
            Ok(row)
        }

        async fn get_file_by_token(&self, secret_token: &str) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE secret_token = ?")
                .bind(secret_token)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn file_exists(&self, message_id: &str) -> MetadataResult<bool> {
            let started = Instant::now();
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE message_id = ?)")
                    .bind(message_id)
                    .fetch_one(&self.pool)
                    .await?;
            self.observe("file_exists", started);
            Ok(exists)
        }

        async fn delete_file(&self, message_id: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM files WHERE message_id = ?")
                .bind(message_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn delete_all_files(&self) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM files")
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }

        async fn increment_downloads(&self, message_id: &str) -> MetadataResult<()> {
            let started = Instant::now();
            let result =
                sqlx::query("UPDATE files SET downloads = downloads + 1 WHERE message_id = ?")
                    .bind(message_id)
                    .execute(&self.pool)
                    .await?;
            self.observe("increment_downloads", started);

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {message_id}")));
            }
            Ok(())
        }

        async fn list_user_files(&self, user_id: &str, limit: u32) -> MetadataResult<Vec<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn stats(&self) -> MetadataResult<StoreStats> {
            let started = Instant::now();
            let (files, users, downloads, bytes): (i64, i64, i64, i64) = sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM files),
                    (SELECT COUNT(*) FROM users),
                    (SELECT COALESCE(SUM(downloads), 0) FROM files),
                    (SELECT COALESCE(SUM(file_size), 0) FROM files)
                "#,
            )
            .fetch_one(&self.pool)
            .await?;
            self.observe("stats", started);

            Ok(StoreStats {
                total_files: files.max(0) as u64,
                total_users: users.max(0) as u64,
                total_downloads: downloads.max(0) as u64,
                total_bytes: bytes.max(0) as u64,
            })
        }
    }

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn register_user(&self, user: &UserRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO users (
                    user_id, username, first_name, last_name,
                    first_used, total_files, last_activity
                ) VALUES (?, ?, ?, ?, ?, 1, ?)
                ON CONFLICT(user_id) DO UPDATE SET
                    username = excluded.username,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    total_files = total_files + 1,
                    last_activity = excluded.last_activity
                "#,
            )
            .bind(&user.user_id)
            .bind(&user.username)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.first_used)
            .bind(user.last_activity)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_user(&self, user_id: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    file_id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    username TEXT,
    file_name TEXT,
    file_size INTEGER NOT NULL DEFAULT 0,
    file_type TEXT,
    secret_token TEXT NOT NULL,
    created_at TEXT NOT NULL,
    downloads INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    username TEXT,
    first_name TEXT,
    last_name TEXT,
    first_used TEXT NOT NULL,
    total_files INTEGER NOT NULL DEFAULT 0,
    last_activity TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_user_id ON files(user_id);
CREATE INDEX IF NOT EXISTS idx_files_created ON files(created_at);
CREATE INDEX IF NOT EXISTS idx_files_secret_token ON files(secret_token);
"#;
