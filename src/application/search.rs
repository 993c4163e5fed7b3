//! Ranked text search with a substring fallback.
//!
//! Whether the storage backend supports ranked full-text search is decided
//! once, at configuration time: the engine is built over a
//! [`SearchMode`] variant and never branches on capability per call.
//!
//! Both modes return the same result shape (entity id, slug, and a score)
//! so callers never need to know which mode executed. Fallback results
//! carry a score of 0.0 and rely purely on recency ordering.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::types::{CallStatus, EntityKind};

/// Queries with at most this many tokens also get a fuzzy trigram pass, so
/// short, typo-prone queries still match.
const FUZZY_TOKEN_LIMIT: usize = 3;

const DEFAULT_RESULT_LIMIT: u32 = 50;

/// How queries are executed, fixed at startup from the backend capability
/// flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Weighted full-text ranking with trigram fuzziness for short queries.
    Ranked,
    /// Case-insensitive substring containment, ordered by recency.
    Substring,
}

/// One search result. Identical shape in both modes; substring matches
/// score 0.0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub slug: String,
    pub score: f32,
}

/// Caller-supplied constraints applied in both modes.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    /// Restrict call results to one lifecycle status. Ignored for startups.
    pub status: Option<CallStatus>,
    pub limit: u32,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

/// A ranked query after tokenization.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedQuery {
    pub raw: String,
    pub tokens: Vec<String>,
    /// Whether the trigram similarity pass applies.
    pub fuzzy: bool,
}

impl RankedQuery {
    pub fn parse(raw: &str) -> Self {
        let tokens = tokenize(raw);
        let fuzzy = !tokens.is_empty() && tokens.len() <= FUZZY_TOKEN_LIMIT;
        Self {
            raw: raw.trim().to_string(),
            tokens,
            fuzzy,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Lowercase word tokens, splitting on anything non-alphanumeric.
pub fn tokenize(raw: &str) -> Vec<String> {
    raw.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// Storage-side query execution, implemented by `infra::db`.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Weighted full-text query; an empty query lists everything by
    /// recency.
    async fn ranked(
        &self,
        kind: EntityKind,
        query: &RankedQuery,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>, RepoError>;

    /// Substring containment over each searchable field; an empty query
    /// lists everything by recency.
    async fn substring(
        &self,
        kind: EntityKind,
        raw: &str,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>, RepoError>;
}

pub struct SearchEngine {
    mode: SearchMode,
    index: Arc<dyn SearchIndex>,
}

impl SearchEngine {
    /// Select the execution mode once from the backend capability flag.
    pub fn new(index: Arc<dyn SearchIndex>, ranked_capability: bool) -> Self {
        let mode = if ranked_capability {
            SearchMode::Ranked
        } else {
            SearchMode::Substring
        };
        debug!(?mode, "Search engine configured");
        Self { mode, index }
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Execute a query. Finite and not restartable: a fresh call re-executes.
    ///
    /// Capability absence is not an error; the fallback runs silently with
    /// the same result shape.
    pub async fn search(
        &self,
        query: &str,
        kind: EntityKind,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>, RepoError> {
        match self.mode {
            SearchMode::Ranked => {
                let parsed = RankedQuery::parse(query);
                self.index.ranked(kind, &parsed, filter).await
            }
            SearchMode::Substring => self.index.substring(kind, query.trim(), filter).await,
        }
    }
}
