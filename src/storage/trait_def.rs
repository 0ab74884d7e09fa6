use crate::models::{ClickEvent, ShortLink, Statistics};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record does not exist. Callers match on this to
    /// synthesize defaults, so it must stay distinct from other failures.
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// Total number of links.
    async fn count_links(&self) -> StorageResult<i64>;

    /// List links ordered by creation time, newest first.
    async fn list_links(&self, limit: i64, offset: i64) -> StorageResult<Vec<ShortLink>>;

    /// Get a link by short code.
    async fn get_link(&self, id: &str) -> StorageResult<ShortLink>;

    /// Insert or overwrite a link.
    ///
    /// When `link.id` is empty a fresh primary key is allocated and encoded
    /// with [`crate::codec::encode`]; the resulting code is written back onto
    /// `link` and returned. Otherwise the stored record is overwritten.
    async fn put_link(&self, link: &mut ShortLink) -> StorageResult<String>;

    /// Remove a link together with its click events and statistics.
    async fn delete_link(&self, id: &str) -> StorageResult<()>;

    /// Get the statistics of a link.
    async fn get_statistics(&self, id: &str) -> StorageResult<Statistics>;

    /// Upsert statistics keyed by `stats.link_id`.
    async fn put_statistics(&self, stats: &Statistics) -> StorageResult<()>;

    /// Append a click event.
    async fn append_click_event(&self, event: &ClickEvent) -> StorageResult<()>;

    /// Number of click events recorded for a link.
    async fn count_click_events(&self, id: &str) -> StorageResult<i64>;

    /// List a link's click events, oldest first.
    async fn list_click_events(
        &self,
        id: &str,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<ClickEvent>>;
}
