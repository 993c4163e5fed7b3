//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{CallRecord, StartupRecord};
use crate::domain::types::CallStatus;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Whether this failure is a uniqueness-constraint conflict, the signal
    /// the slug allocator retries on.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallQueryFilter {
    pub status: Option<CallStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StartupQueryFilter {
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateCallParams {
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub body_markdown: String,
    pub status: CallStatus,
    pub opens_at: Option<OffsetDateTime>,
    pub closes_at: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct UpdateCallParams {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub body_markdown: String,
    pub status: CallStatus,
    pub opens_at: Option<OffsetDateTime>,
    pub closes_at: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct CreateStartupParams {
    pub slug: String,
    pub name: String,
    pub pitch: String,
    pub description: String,
    pub website: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateStartupParams {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub pitch: String,
    pub description: String,
    pub website: Option<String>,
}

#[async_trait]
pub trait CallsRepo: Send + Sync {
    async fn list_calls(
        &self,
        filter: &CallQueryFilter,
        limit: u32,
    ) -> Result<Vec<CallRecord>, RepoError>;

    async fn count_calls(&self, filter: &CallQueryFilter) -> Result<u64, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<CallRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CallRecord>, RepoError>;
}

#[async_trait]
pub trait CallsWriteRepo: Send + Sync {
    /// Insert a new call. The slug column carries a unique index; a
    /// conflicting slug surfaces as [`RepoError::Duplicate`], which is the
    /// retry signal for `application::slugs::SlugAllocator`.
    async fn create_call(&self, params: CreateCallParams) -> Result<CallRecord, RepoError>;

    async fn update_call(&self, params: UpdateCallParams) -> Result<CallRecord, RepoError>;

    async fn delete_call(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait StartupsRepo: Send + Sync {
    async fn list_startups(
        &self,
        filter: &StartupQueryFilter,
        limit: u32,
    ) -> Result<Vec<StartupRecord>, RepoError>;

    async fn count_startups(&self, filter: &StartupQueryFilter) -> Result<u64, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<StartupRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StartupRecord>, RepoError>;
}

#[async_trait]
pub trait StartupsWriteRepo: Send + Sync {
    /// Insert a new startup; slug conflicts surface as
    /// [`RepoError::Duplicate`], see [`CallsWriteRepo::create_call`].
    async fn create_startup(&self, params: CreateStartupParams)
    -> Result<StartupRecord, RepoError>;

    async fn update_startup(&self, params: UpdateStartupParams)
    -> Result<StartupRecord, RepoError>;

    async fn delete_startup(&self, id: Uuid) -> Result<(), RepoError>;
}

/// Streaming access for re-index and warm-up consumers.
pub trait StreamingRepo: Send + Sync {
    fn stream_all_calls(&self) -> BoxStream<'_, Result<CallRecord, RepoError>>;

    fn stream_all_startups(&self) -> BoxStream<'_, Result<StartupRecord, RepoError>>;
}
