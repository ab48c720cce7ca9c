use crate::services::embed_service::{EmbeddingClient, EmbeddingError};
use crate::services::quiz_store::{QuizStore, StoreError};
use crate::services::similarity_service::SimilarityIndex;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_REPAIR_BATCH: i64 = 20;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    pub repaired: usize,
    pub rejected: usize,
    pub still_pending: usize,
}

/// Backfills embeddings for quizzes stored without one.
#[derive(Clone)]
pub struct IndexRepairService {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn SimilarityIndex>,
    store: Arc<dyn QuizStore>,
    call_timeout: Duration,
}

impl IndexRepairService {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn SimilarityIndex>,
        store: Arc<dyn QuizStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            call_timeout,
        }
    }

    pub async fn run_once(&self, batch: i64) -> Result<RepairReport, StoreError> {
        let pending = self.store.pending_embeddings(batch).await?;
        let mut report = RepairReport::default();

        for mut record in pending {
            let outcome =
                tokio::time::timeout(self.call_timeout, self.embedder.embed(&record.document_text))
                    .await
                    .unwrap_or_else(|_| {
                        Err(EmbeddingError::Transient("embedding call timed out".to_string()))
                    });

            match outcome {
                Ok(embedding) if !embedding.is_empty() => {
                    self.store.set_embedding(record.id, &embedding).await?;
                    record.embedding = embedding;
                    if let Err(e) = self.index.upsert(&record).await {
                        tracing::warn!(quiz_id = %record.id, error = %e, "index upsert failed during repair");
                    }
                    report.repaired += 1;
                }
                Ok(_) => {
                    tracing::warn!(quiz_id = %record.id, "quiz has no text to embed");
                    self.store.mark_embedding_rejected(record.id).await?;
                    report.rejected += 1;
                }
                Err(EmbeddingError::ContentRejected(msg)) => {
                    tracing::warn!(quiz_id = %record.id, error = %msg, "embedding rejected, not retrying");
                    self.store.mark_embedding_rejected(record.id).await?;
                    report.rejected += 1;
                }
                Err(EmbeddingError::Transient(msg)) => {
                    tracing::debug!(quiz_id = %record.id, error = %msg, "embedding still unavailable");
                    report.still_pending += 1;
                }
            }
        }

        if report != RepairReport::default() {
            tracing::info!(
                repaired = report.repaired,
                rejected = report.rejected,
                still_pending = report.still_pending,
                "embedding repair pass finished"
            );
        }
        Ok(report)
    }
}
