use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CallQueryFilter, CallsRepo, CallsWriteRepo, CreateCallParams, RepoError, UpdateCallParams,
};
use crate::domain::entities::CallRecord;
use crate::domain::types::CallStatus;

use super::{PostgresRepositories, map_sqlx_error};

const CALL_COLUMNS: &str = "id, slug, title, summary, body_markdown, status, opens_at, \
                            closes_at, published_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct CallRow {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub body_markdown: String,
    pub status: CallStatus,
    pub opens_at: Option<OffsetDateTime>,
    pub closes_at: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<CallRow> for CallRecord {
    fn from(row: CallRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            summary: row.summary,
            body_markdown: row.body_markdown,
            status: row.status,
            opens_at: row.opens_at,
            closes_at: row.closes_at,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn apply_call_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q CallQueryFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND c.status = ");
        qb.push_bind(status);
    }

    if let Some(search) = filter.search.as_ref() {
        qb.push(" AND (");
        qb.push("c.title ILIKE ");
        qb.push_bind(format!("%{}%", search));
        qb.push(" OR c.slug ILIKE ");
        qb.push_bind(format!("%{}%", search));
        qb.push(" OR c.summary ILIKE ");
        qb.push_bind(format!("%{}%", search));
        qb.push(")");
    }
}

#[async_trait]
impl CallsRepo for PostgresRepositories {
    async fn list_calls(
        &self,
        filter: &CallQueryFilter,
        limit: u32,
    ) -> Result<Vec<CallRecord>, RepoError> {
        let limit = limit.clamp(1, 100) as i64;

        let mut qb = QueryBuilder::new(format!(
            "SELECT {CALL_COLUMNS} FROM calls c WHERE 1=1 "
        ));
        apply_call_filter(&mut qb, filter);
        qb.push(" ORDER BY c.updated_at DESC, c.id DESC LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build_query_as::<CallRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CallRecord::from).collect())
    }

    async fn count_calls(&self, filter: &CallQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM calls c WHERE 1=1 ");
        apply_call_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<CallRecord>, RepoError> {
        let row = sqlx::query_as::<_, CallRow>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CallRecord::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CallRecord>, RepoError> {
        let row = sqlx::query_as::<_, CallRow>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CallRecord::from))
    }
}

#[async_trait]
impl CallsWriteRepo for PostgresRepositories {
    async fn create_call(&self, params: CreateCallParams) -> Result<CallRecord, RepoError> {
        let row = sqlx::query_as::<_, CallRow>(&format!(
            "INSERT INTO calls (slug, title, summary, body_markdown, status, opens_at, \
             closes_at, published_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {CALL_COLUMNS}"
        ))
        .bind(&params.slug)
        .bind(&params.title)
        .bind(&params.summary)
        .bind(&params.body_markdown)
        .bind(params.status)
        .bind(params.opens_at)
        .bind(params.closes_at)
        .bind(params.published_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(CallRecord::from(row))
    }

    async fn update_call(&self, params: UpdateCallParams) -> Result<CallRecord, RepoError> {
        let row = sqlx::query_as::<_, CallRow>(&format!(
            "UPDATE calls SET slug = $2, title = $3, summary = $4, body_markdown = $5, \
             status = $6, opens_at = $7, closes_at = $8, published_at = $9, \
             updated_at = now() WHERE id = $1 RETURNING {CALL_COLUMNS}"
        ))
        .bind(params.id)
        .bind(&params.slug)
        .bind(&params.title)
        .bind(&params.summary)
        .bind(&params.body_markdown)
        .bind(params.status)
        .bind(params.opens_at)
        .bind(params.closes_at)
        .bind(params.published_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(CallRecord::from(row))
    }

    async fn delete_call(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM calls WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
