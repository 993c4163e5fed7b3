use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CreateStartupParams, RepoError, StartupQueryFilter, StartupsRepo, StartupsWriteRepo,
    UpdateStartupParams,
};
use crate::domain::entities::StartupRecord;

use super::{PostgresRepositories, map_sqlx_error};

const STARTUP_COLUMNS: &str = "id, slug, name, pitch, description, website, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct StartupRow {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub pitch: String,
    pub description: String,
    pub website: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<StartupRow> for StartupRecord {
    fn from(row: StartupRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            pitch: row.pitch,
            description: row.description,
            website: row.website,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn apply_startup_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q StartupQueryFilter) {
    if let Some(search) = filter.search.as_ref() {
        qb.push(" AND (");
        qb.push("s.name ILIKE ");
        qb.push_bind(format!("%{}%", search));
        qb.push(" OR s.slug ILIKE ");
        qb.push_bind(format!("%{}%", search));
        qb.push(" OR s.pitch ILIKE ");
        qb.push_bind(format!("%{}%", search));
        qb.push(")");
    }
}

#[async_trait]
impl StartupsRepo for PostgresRepositories {
    async fn list_startups(
        &self,
        filter: &StartupQueryFilter,
        limit: u32,
    ) -> Result<Vec<StartupRecord>, RepoError> {
        let limit = limit.clamp(1, 100) as i64;

        let mut qb = QueryBuilder::new(format!(
            "SELECT {STARTUP_COLUMNS} FROM startups s WHERE 1=1 "
        ));
        apply_startup_filter(&mut qb, filter);
        qb.push(" ORDER BY s.updated_at DESC, s.id DESC LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build_query_as::<StartupRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(StartupRecord::from).collect())
    }

    async fn count_startups(&self, filter: &StartupQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM startups s WHERE 1=1 ");
        apply_startup_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<StartupRecord>, RepoError> {
        let row = sqlx::query_as::<_, StartupRow>(&format!(
            "SELECT {STARTUP_COLUMNS} FROM startups WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(StartupRecord::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StartupRecord>, RepoError> {
        let row = sqlx::query_as::<_, StartupRow>(&format!(
            "SELECT {STARTUP_COLUMNS} FROM startups WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(StartupRecord::from))
    }
}

#[async_trait]
impl StartupsWriteRepo for PostgresRepositories {
    async fn create_startup(
        &self,
        params: CreateStartupParams,
    ) -> Result<StartupRecord, RepoError> {
        let row = sqlx::query_as::<_, StartupRow>(&format!(
            "INSERT INTO startups (slug, name, pitch, description, website) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {STARTUP_COLUMNS}"
        ))
        .bind(&params.slug)
        .bind(&params.name)
        .bind(&params.pitch)
        .bind(&params.description)
        .bind(&params.website)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(StartupRecord::from(row))
    }

    async fn update_startup(
        &self,
        params: UpdateStartupParams,
    ) -> Result<StartupRecord, RepoError> {
        let row = sqlx::query_as::<_, StartupRow>(&format!(
            "UPDATE startups SET slug = $2, name = $3, pitch = $4, description = $5, \
             website = $6, updated_at = now() WHERE id = $1 RETURNING {STARTUP_COLUMNS}"
        ))
        .bind(params.id)
        .bind(&params.slug)
        .bind(&params.name)
        .bind(&params.pitch)
        .bind(&params.description)
        .bind(&params.website)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(StartupRecord::from(row))
    }

    async fn delete_startup(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM startups WHERE id = $1")
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
