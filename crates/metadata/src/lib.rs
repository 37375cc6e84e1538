//! Durable metadata for the filegate gateway.
//!
//! This crate records published files and their owners:
//! - File records keyed by upstream resource identifier
//! - Download counters
//! - Users and aggregate statistics

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{FileRow, StoreStats, UserRow};
pub use repos::{FileRepo, UserRepo};
pub use store::{MetadataStore, SqliteStore};

use filegate_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
