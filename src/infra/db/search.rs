//! Postgres execution of ranked and substring search.
//!
//! Ranked mode relies on the stored `search_vector` columns (weight A on
//! title/name, lower weights on the descriptive fields) plus `pg_trgm`
//! similarity on the title for short queries. Substring mode is plain
//! `ILIKE` containment. Both shapes return `(id, slug, score)` rows ordered
//! so that callers never branch on which mode ran.

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::application::search::{RankedQuery, SearchFilter, SearchHit, SearchIndex};
use crate::domain::types::EntityKind;

use super::{PostgresRepositories, map_sqlx_error};

/// Minimum trigram similarity for a fuzzy-only match.
const TRIGRAM_SIMILARITY_FLOOR: f32 = 0.3;

struct EntitySearchTarget {
    table: &'static str,
    /// Highest-weighted field, also the target of the trigram pass.
    title_column: &'static str,
    /// All searchable fields, for substring containment.
    columns: &'static [&'static str],
    has_status: bool,
}

fn search_target(kind: EntityKind) -> EntitySearchTarget {
    match kind {
        EntityKind::Call => EntitySearchTarget {
            table: "calls",
            title_column: "title",
            columns: &["title", "summary", "body_markdown"],
            has_status: true,
        },
        EntityKind::Startup => EntitySearchTarget {
            table: "startups",
            title_column: "name",
            columns: &["name", "pitch", "description"],
            has_status: false,
        },
    }
}

#[derive(sqlx::FromRow)]
struct HitRow {
    id: Uuid,
    slug: String,
    score: f32,
}

impl From<HitRow> for SearchHit {
    fn from(row: HitRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            score: row.score,
        }
    }
}

fn push_status_filter<'q>(
    qb: &mut QueryBuilder<'q, Postgres>,
    target: &EntitySearchTarget,
    filter: &'q SearchFilter,
) {
    if target.has_status {
        if let Some(status) = filter.status {
            qb.push(" AND t.status = ");
            qb.push_bind(status);
        }
    }
}

impl PostgresRepositories {
    /// Everything for an entity kind, newest first, score pinned to zero.
    /// Serves the empty query in both modes.
    async fn recent_hits(
        &self,
        target: &EntitySearchTarget,
        filter: &SearchFilter,
        limit: i64,
    ) -> Result<Vec<SearchHit>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT t.id, t.slug, 0.0::float4 AS score FROM {} t WHERE 1=1 ",
            target.table
        ));
        push_status_filter(&mut qb, target, filter);
        qb.push(" ORDER BY t.updated_at DESC, t.id DESC LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build_query_as::<HitRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SearchHit::from).collect())
    }
}

#[async_trait]
impl SearchIndex for PostgresRepositories {
    async fn ranked(
        &self,
        kind: EntityKind,
        query: &RankedQuery,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>, RepoError> {
        let target = search_target(kind);
        let limit = i64::from(filter.limit.clamp(1, 200));

        if query.is_empty() {
            return self.recent_hits(&target, filter, limit).await;
        }

        let mut qb = QueryBuilder::new("SELECT t.id, t.slug, (ts_rank(t.search_vector, query)");
        if query.fuzzy {
            qb.push(format!(" + similarity(t.{}, ", target.title_column));
            qb.push_bind(&query.raw);
            qb.push(")");
        }
        qb.push(format!(
            ")::float4 AS score FROM {} t, websearch_to_tsquery('simple', ",
            target.table
        ));
        qb.push_bind(&query.raw);
        qb.push(") AS query WHERE (t.search_vector @@ query");
        if query.fuzzy {
            qb.push(format!(" OR similarity(t.{}, ", target.title_column));
            qb.push_bind(&query.raw);
            qb.push(") > ");
            qb.push_bind(TRIGRAM_SIMILARITY_FLOOR);
        }
        qb.push(")");
        push_status_filter(&mut qb, &target, filter);
        qb.push(" ORDER BY score DESC, t.updated_at DESC, t.id DESC LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build_query_as::<HitRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SearchHit::from).collect())
    }

    async fn substring(
        &self,
        kind: EntityKind,
        raw: &str,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>, RepoError> {
        let target = search_target(kind);
        let limit = i64::from(filter.limit.clamp(1, 200));

        if raw.is_empty() {
            return self.recent_hits(&target, filter, limit).await;
        }

        let mut qb = QueryBuilder::new(format!(
            "SELECT t.id, t.slug, 0.0::float4 AS score FROM {} t WHERE (",
            target.table
        ));
        let mut first = true;
        for column in target.columns {
            if !first {
                qb.push(" OR ");
            }
            first = false;
            qb.push(format!("t.{column} ILIKE "));
            qb.push_bind(format!("%{raw}%"));
        }
        qb.push(")");
        push_status_filter(&mut qb, &target, filter);
        qb.push(" ORDER BY t.updated_at DESC, t.id DESC LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build_query_as::<HitRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SearchHit::from).collect())
    }
}
