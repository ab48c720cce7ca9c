use crate::models::language::Language;
use crate::models::quiz::{PaginatedQuizzes, PromptCount, QuizRecord, QuizSummary};
use crate::utils::encoding::{to_data_url, PNG_MIME};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 9;
pub const DEFAULT_PROMPT_RECOMMENDATIONS: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored quiz is malformed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Durable home of quiz records.
#[async_trait]
pub trait QuizStore: Send + Sync {
    /// Inserts or overwrites the record with the same id.
    async fn save(&self, record: &QuizRecord) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<QuizRecord>, StoreError>;

    /// Zero-based page of an owner's quizzes, newest first.
    async fn list_by_owner(
        &self,
        owner_id: &str,
        page: i64,
        size: i64,
    ) -> Result<PaginatedQuizzes, StoreError>;

    async fn top_prompts(&self, owner_id: &str, limit: i64)
        -> Result<Vec<PromptCount>, StoreError>;

    /// Oldest records that still lack an embedding and were not rejected.
    async fn pending_embeddings(&self, limit: i64) -> Result<Vec<QuizRecord>, StoreError>;

    async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<(), StoreError>;

    async fn mark_embedding_rejected(&self, id: Uuid) -> Result<(), StoreError>;
}

fn summarize(record: &QuizRecord) -> QuizSummary {
    QuizSummary {
        id: record.id,
        title: record.title.clone(),
        language: record.language,
        prompt: record.prompt.clone(),
        preview_image: to_data_url(PNG_MIME, &record.preview_image),
        created_at: record.created_at,
    }
}

pub(crate) const RECORD_COLUMNS: &str = "id, owner_id, title, question_groups, document, document_text, \
     preview_image, embedding, language, prompt, created_at";

pub(crate) fn record_from_row(row: &PgRow) -> Result<QuizRecord, StoreError> {
    let groups: serde_json::Value = row.try_get("question_groups")?;
    let language: String = row.try_get("language")?;
    Ok(QuizRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        question_groups: serde_json::from_value(groups)?,
        document: row.try_get("document")?,
        document_text: row.try_get("document_text")?,
        embedding: row.try_get("embedding")?,
        preview_image: row.try_get("preview_image")?,
        language: language
            .parse::<Language>()
            .map_err(StoreError::Serialization)?,
        prompt: row.try_get("prompt")?,
        created_at: row.try_get("created_at")?,
        relevance_score: None,
    })
}

/// Writes the whole record. A record previously marked rejected stays
/// rejected until it receives a vector.
pub(crate) async fn write_record(pool: &PgPool, record: &QuizRecord) -> Result<(), StoreError> {
    let groups = serde_json::to_value(&record.question_groups)?;
    sqlx::query(
        r#"
        INSERT INTO quizzes (id, owner_id, title, question_groups, document, document_text,
                             preview_image, embedding, embedding_state, language, prompt, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                CASE WHEN cardinality($8::real[]) > 0 THEN 'indexed' ELSE 'pending' END,
                $9, $10, $11)
        ON CONFLICT (id) DO UPDATE SET
            owner_id = EXCLUDED.owner_id,
            title = EXCLUDED.title,
            question_groups = EXCLUDED.question_groups,
            document = EXCLUDED.document,
            document_text = EXCLUDED.document_text,
            preview_image = EXCLUDED.preview_image,
            embedding = EXCLUDED.embedding,
            embedding_state = CASE
                WHEN cardinality(EXCLUDED.embedding) > 0 THEN 'indexed'
                WHEN quizzes.embedding_state = 'rejected' THEN 'rejected'
                ELSE 'pending'
            END,
            language = EXCLUDED.language,
            prompt = EXCLUDED.prompt
        "#,
    )
    .bind(record.id)
    .bind(&record.owner_id)
    .bind(&record.title)
    .bind(groups)
    .bind(&record.document)
    .bind(&record.document_text)
    .bind(&record.preview_image)
    .bind(&record.embedding)
    .bind(record.language.code())
    .bind(&record.prompt)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgQuizStore {
    pool: PgPool,
}

impl PgQuizStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuizStore for PgQuizStore {
    async fn save(&self, record: &QuizRecord) -> Result<(), StoreError> {
        write_record(&self.pool, record).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<QuizRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM quizzes WHERE id = $1", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        page: i64,
        size: i64,
    ) -> Result<PaginatedQuizzes, StoreError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM quizzes WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM quizzes WHERE owner_id = $1 ORDER BY created_at DESC, seq DESC LIMIT $2 OFFSET $3",
            RECORD_COLUMNS
        ))
        .bind(owner_id)
        .bind(size)
        .bind(page.saturating_mul(size))
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(|row| record_from_row(row).map(|r| summarize(&r)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PaginatedQuizzes::new(items, total, page, size))
    }

    async fn top_prompts(
        &self,
        owner_id: &str,
        limit: i64,
    ) -> Result<Vec<PromptCount>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT prompt, COUNT(*) AS count
            FROM quizzes
            WHERE owner_id = $1
            GROUP BY prompt
            ORDER BY count DESC, prompt ASC
            LIMIT $2
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PromptCount, StoreError> {
                Ok(PromptCount {
                    prompt: row.try_get("prompt")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    async fn pending_embeddings(&self, limit: i64) -> Result<Vec<QuizRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM quizzes WHERE embedding_state = 'pending' ORDER BY seq ASC LIMIT $1",
            RECORD_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE quizzes
            SET embedding = $2,
                embedding_state = CASE WHEN cardinality($2::real[]) > 0 THEN 'indexed' ELSE 'pending' END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(embedding)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_embedding_rejected(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE quizzes SET embedding_state = 'rejected' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

struct StoredQuiz {
    record: QuizRecord,
    rejected: bool,
}

/// Process-local store, for tests and running without a database.
#[derive(Default)]
pub struct InMemoryQuizStore {
    quizzes: RwLock<Vec<StoredQuiz>>,
}

impl InMemoryQuizStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.quizzes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.quizzes.read().await.is_empty()
    }
}

#[async_trait]
impl QuizStore for InMemoryQuizStore {
    async fn save(&self, record: &QuizRecord) -> Result<(), StoreError> {
        let mut quizzes = self.quizzes.write().await;
        let mut record = record.clone();
        record.relevance_score = None;
        match quizzes.iter_mut().find(|q| q.record.id == record.id) {
            Some(existing) => {
                existing.rejected = existing.rejected && record.embedding.is_empty();
                existing.record = record;
            }
            None => quizzes.push(StoredQuiz {
                record,
                rejected: false,
            }),
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QuizRecord>, StoreError> {
        let quizzes = self.quizzes.read().await;
        Ok(quizzes
            .iter()
            .find(|q| q.record.id == id)
            .map(|q| q.record.clone()))
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        page: i64,
        size: i64,
    ) -> Result<PaginatedQuizzes, StoreError> {
        let quizzes = self.quizzes.read().await;
        // Reverse insertion order first so equal timestamps list newest first.
        let mut owned: Vec<&QuizRecord> = quizzes
            .iter()
            .rev()
            .map(|q| &q.record)
            .filter(|r| r.owner_id.as_deref() == Some(owner_id))
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = owned.len() as i64;
        let items = owned
            .into_iter()
            .skip(usize::try_from(page.saturating_mul(size)).unwrap_or(usize::MAX))
            .take(usize::try_from(size).unwrap_or(0))
            .map(summarize)
            .collect();
        Ok(PaginatedQuizzes::new(items, total, page, size))
    }

    async fn top_prompts(
        &self,
        owner_id: &str,
        limit: i64,
    ) -> Result<Vec<PromptCount>, StoreError> {
        let quizzes = self.quizzes.read().await;
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for q in quizzes
            .iter()
            .filter(|q| q.record.owner_id.as_deref() == Some(owner_id))
        {
            *counts.entry(q.record.prompt.as_str()).or_default() += 1;
        }

        let mut ranked: Vec<PromptCount> = counts
            .into_iter()
            .map(|(prompt, count)| PromptCount {
                prompt: prompt.to_string(),
                count,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.prompt.cmp(&b.prompt)));
        ranked.truncate(limit.max(0) as usize);
        Ok(ranked)
    }

    async fn pending_embeddings(&self, limit: i64) -> Result<Vec<QuizRecord>, StoreError> {
        let quizzes = self.quizzes.read().await;
        Ok(quizzes
            .iter()
            .filter(|q| !q.rejected && q.record.embedding.is_empty())
            .take(limit.max(0) as usize)
            .map(|q| q.record.clone())
            .collect())
    }

    async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<(), StoreError> {
        let mut quizzes = self.quizzes.write().await;
        if let Some(q) = quizzes.iter_mut().find(|q| q.record.id == id) {
            q.record.embedding = embedding.to_vec();
        }
        Ok(())
    }

    async fn mark_embedding_rejected(&self, id: Uuid) -> Result<(), StoreError> {
        let mut quizzes = self.quizzes.write().await;
        if let Some(q) = quizzes.iter_mut().find(|q| q.record.id == id) {
            q.rejected = true;
        }
        Ok(())
    }
}
