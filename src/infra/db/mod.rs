//! Postgres-backed repository implementations.

mod calls;
mod search;
mod startups;

use std::sync::Arc;

use futures::{StreamExt, stream::BoxStream};
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::{RepoError, StreamingRepo};
use crate::domain::entities::{CallRecord, StartupRecord};

use calls::CallRow;
use startups::StartupRow;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}

impl StreamingRepo for PostgresRepositories {
    fn stream_all_calls(&self) -> BoxStream<'_, Result<CallRecord, RepoError>> {
        let stream = sqlx::query_as::<_, CallRow>(
            "SELECT id, slug, title, summary, body_markdown, status, opens_at, closes_at, \
             published_at, created_at, updated_at FROM calls ORDER BY slug",
        )
        .fetch(self.pool())
        .map(|row| match row {
            Ok(record) => Ok(CallRecord::from(record)),
            Err(err) => Err(map_sqlx_error(err)),
        });

        Box::pin(stream)
    }

    fn stream_all_startups(&self) -> BoxStream<'_, Result<StartupRecord, RepoError>> {
        let stream = sqlx::query_as::<_, StartupRow>(
            "SELECT id, slug, name, pitch, description, website, created_at, updated_at \
             FROM startups ORDER BY slug",
        )
        .fetch(self.pool())
        .map(|row| match row {
            Ok(record) => Ok(StartupRecord::from(record)),
            Err(err) => Err(map_sqlx_error(err)),
        });

        Box::pin(stream)
    }
}

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.message().contains("violates foreign key constraint")
                || db.message().contains("invalid input syntax") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db) if db.message().contains("violates") => RepoError::Integrity {
            message: db.message().to_string(),
        },
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}
