use crate::models::language::Language;
use crate::models::quiz::QuizRecord;
use crate::services::embed_service::cosine_sim;
use crate::services::quiz_store::{record_from_row, write_record, RECORD_COLUMNS};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_CANDIDATE_POOL: usize = 200;
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("similarity index unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for IndexError {
    fn from(err: sqlx::Error) -> Self {
        IndexError::Unavailable(err.to_string())
    }
}

/// Nearest-neighbour lookup over quiz embeddings.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Stores or overwrites the entry keyed by the record id.
    async fn upsert(&self, record: &QuizRecord) -> Result<(), IndexError>;

    /// Up to `top_k` records of the given owner and language, ordered by
    /// descending relevance. Owner and language are applied after the
    /// `candidate_pool` nearest vectors have been selected, so fewer than
    /// `top_k` results can come back even when more matching records exist.
    async fn query(
        &self,
        embedding: &[f32],
        owner_id: Option<&str>,
        language: Language,
        candidate_pool: usize,
        top_k: usize,
    ) -> Result<Vec<(QuizRecord, f32)>, IndexError>;
}

/// Cosine similarity mapped onto [0, 1].
pub fn relevance_score(query: &[f32], candidate: &[f32]) -> f32 {
    (1.0 + cosine_sim(query, candidate)) / 2.0
}

/// Scores every vector of the query's dimensionality and keeps the best
/// `candidate_pool`, as `(position, score)`. Equal scores keep their input
/// order.
pub fn rank_candidates<'a, I>(query: &[f32], vectors: I, candidate_pool: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    if query.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, f32)> = vectors
        .into_iter()
        .enumerate()
        .filter(|(_, v)| v.len() == query.len())
        .map(|(idx, v)| (idx, relevance_score(query, v)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(candidate_pool);
    scored
}

fn matches_filters(record: &QuizRecord, owner_id: Option<&str>, language: Language) -> bool {
    record.owner_id.as_deref() == owner_id && record.language == language
}

/// Index kept in process memory, in insertion order.
#[derive(Default)]
pub struct InMemorySimilarityIndex {
    entries: RwLock<Vec<QuizRecord>>,
}

impl InMemorySimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SimilarityIndex for InMemorySimilarityIndex {
    async fn upsert(&self, record: &QuizRecord) -> Result<(), IndexError> {
        let mut entries = self.entries.write().await;
        let mut record = record.clone();
        record.relevance_score = None;
        // An overwrite keeps the original position for tie-breaking.
        match entries.iter_mut().find(|e| e.id == record.id) {
            Some(existing) => *existing = record,
            None => entries.push(record),
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        owner_id: Option<&str>,
        language: Language,
        candidate_pool: usize,
        top_k: usize,
    ) -> Result<Vec<(QuizRecord, f32)>, IndexError> {
        let entries = self.entries.read().await;
        let ranked = rank_candidates(
            embedding,
            entries.iter().map(|e| e.embedding.as_slice()),
            candidate_pool,
        );

        Ok(ranked
            .into_iter()
            .filter(|(idx, _)| matches_filters(&entries[*idx], owner_id, language))
            .take(top_k)
            .map(|(idx, score)| (entries[idx].clone().with_relevance(score), score))
            .collect())
    }
}

/// Index backed by the `quizzes` table. Vectors are scored in process.
#[derive(Clone)]
pub struct PgSimilarityIndex {
    pool: PgPool,
}

impl PgSimilarityIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SimilarityIndex for PgSimilarityIndex {
    async fn upsert(&self, record: &QuizRecord) -> Result<(), IndexError> {
        write_record(&self.pool, record)
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))
    }

    async fn query(
        &self,
        embedding: &[f32],
        owner_id: Option<&str>,
        language: Language,
        candidate_pool: usize,
        top_k: usize,
    ) -> Result<Vec<(QuizRecord, f32)>, IndexError> {
        if embedding.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, embedding FROM quizzes WHERE cardinality(embedding) = $1 ORDER BY seq ASC",
        )
        .bind(embedding.len() as i32)
        .fetch_all(&self.pool)
        .await?;

        let mut ids = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len());
        for row in &rows {
            ids.push(row.try_get::<Uuid, _>("id")?);
            vectors.push(row.try_get::<Vec<f32>, _>("embedding")?);
        }

        let ranked = rank_candidates(embedding, vectors.iter().map(Vec::as_slice), candidate_pool);
        if ranked.is_empty() {
            return Ok(Vec::new());
        }
        let candidate_ids: Vec<Uuid> = ranked.iter().map(|(idx, _)| ids[*idx]).collect();

        let rows = sqlx::query(&format!(
            "SELECT {} FROM quizzes WHERE id = ANY($1) AND owner_id IS NOT DISTINCT FROM $2 AND language = $3",
            RECORD_COLUMNS
        ))
        .bind(&candidate_ids)
        .bind(owner_id)
        .bind(language.code())
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: HashMap<Uuid, QuizRecord> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let record = record_from_row(row).map_err(|e| IndexError::Unavailable(e.to_string()))?;
            by_id.insert(record.id, record);
        }

        Ok(ranked
            .into_iter()
            .filter_map(|(idx, score)| {
                by_id
                    .remove(&ids[idx])
                    .map(|r| (r.with_relevance(score), score))
            })
            .take(top_k)
            .collect())
    }
}
