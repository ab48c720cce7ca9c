use crate::dto::quiz_dto::GenerationRequest;
use crate::models::question_group::QuestionGroup;
use crate::models::quiz::QuizRecord;
use crate::services::ai_service::{basic_quiz_prompt, context_quiz_prompt, ModelError, QuizModel};
use crate::services::document_service::{DocumentRenderer, RenderError};
use crate::services::embed_service::{EmbeddingClient, EmbeddingError};
use crate::services::parser_service::{parse_response, ParseError};
use crate::services::quiz_store::{QuizStore, StoreError};
use crate::services::similarity_service::{
    SimilarityIndex, DEFAULT_CANDIDATE_POOL, DEFAULT_TOP_K,
};
use crate::utils::time;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Context candidates must score strictly above this.
    pub relevance_threshold: f32,
    pub candidate_pool: usize,
    pub top_k: usize,
    /// Bound on each model, embedding and index call.
    pub call_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.85,
            candidate_pool: DEFAULT_CANDIDATE_POOL,
            top_k: DEFAULT_TOP_K,
            call_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Basic,
    /// Prior quizzes of the same owner and language are passed to the model
    /// so it avoids repeating them.
    WithContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Requested,
    ContextQueried,
    Parsed,
    Rendered,
    Embedded,
    Persisted,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Requested => "requested",
            PipelineStage::ContextQueried => "context_queried",
            PipelineStage::Parsed => "parsed",
            PipelineStage::Rendered => "rendered",
            PipelineStage::Embedded => "embedded",
            PipelineStage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("content rejected by the embedding provider: {0}")]
    ContentRejected(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Raw model output together with how many prior quizzes shaped the prompt.
#[derive(Debug, Clone)]
pub struct Completion {
    pub raw_text: String,
    pub context_quizzes: usize,
}

#[derive(Debug, Clone)]
pub struct GeneratedQuiz {
    pub record: QuizRecord,
    pub context_quizzes: usize,
}

/// Drives a generation from prompt to persisted quiz.
#[derive(Clone)]
pub struct QuizPipeline {
    model: Arc<dyn QuizModel>,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn SimilarityIndex>,
    store: Arc<dyn QuizStore>,
    renderer: DocumentRenderer,
    settings: PipelineSettings,
}

impl QuizPipeline {
    pub fn new(
        model: Arc<dyn QuizModel>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn SimilarityIndex>,
        store: Arc<dyn QuizStore>,
        renderer: DocumentRenderer,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            model,
            embedder,
            index,
            store,
            renderer,
            settings,
        }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
        mode: GenerationMode,
    ) -> Result<GeneratedQuiz, PipelineError> {
        let completion = self.request_completion(request, mode).await?;
        let record = self.process_completion(&completion.raw_text, request).await?;
        Ok(GeneratedQuiz {
            record,
            context_quizzes: completion.context_quizzes,
        })
    }

    /// Builds the prompt and asks the model for a quiz. In context mode the
    /// similarity lookup finishes before the model is called.
    pub async fn request_completion(
        &self,
        request: &GenerationRequest,
        mode: GenerationMode,
    ) -> Result<Completion, PipelineError> {
        tracing::info!(
            owner_id = request.owner_id.as_deref().unwrap_or("-"),
            language = %request.language,
            questions = request.question_count,
            stage = %PipelineStage::Requested,
            "quiz generation requested"
        );

        let context = match mode {
            GenerationMode::Basic => Vec::new(),
            GenerationMode::WithContext => self.assemble_context(request).await?,
        };

        let prompt = if context.is_empty() {
            basic_quiz_prompt(request.language, request.question_count, &request.prompt)
        } else {
            context_quiz_prompt(
                request.language,
                request.question_count,
                &request.prompt,
                &serialize_context(&context),
            )
        };

        let raw_text = tokio::time::timeout(self.settings.call_timeout, self.model.complete(&prompt))
            .await
            .map_err(|_| ModelError::Transient("model call timed out".to_string()))??;

        Ok(Completion {
            raw_text,
            context_quizzes: context.len(),
        })
    }

    /// Prior quizzes of the requester that are close enough to the prompt to
    /// be worth avoiding. Any lookup failure other than a content rejection
    /// yields no context.
    pub async fn assemble_context(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<QuizRecord>, PipelineError> {
        let embedding = match self.embed(&request.prompt).await {
            Ok(v) => v,
            Err(EmbeddingError::ContentRejected(msg)) => {
                return Err(PipelineError::ContentRejected(msg))
            }
            Err(EmbeddingError::Transient(msg)) => {
                tracing::warn!(error = %msg, "prompt embedding failed, generating without context");
                return Ok(Vec::new());
            }
        };
        if embedding.is_empty() {
            return Ok(Vec::new());
        }

        let lookup = self.index.query(
            &embedding,
            request.owner_id.as_deref(),
            request.language,
            self.settings.candidate_pool,
            self.settings.top_k,
        );
        let candidates = match tokio::time::timeout(self.settings.call_timeout, lookup).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "similarity index unavailable, generating without context");
                return Ok(Vec::new());
            }
            Err(_) => {
                tracing::warn!("similarity query timed out, generating without context");
                return Ok(Vec::new());
            }
        };

        let returned = candidates.len();
        let context: Vec<QuizRecord> = candidates
            .into_iter()
            .filter(|(_, score)| *score > self.settings.relevance_threshold)
            .map(|(record, _)| record)
            .collect();

        tracing::info!(
            owner_id = request.owner_id.as_deref().unwrap_or("-"),
            candidates = returned,
            kept = context.len(),
            stage = %PipelineStage::ContextQueried,
            "generation context assembled"
        );
        Ok(context)
    }

    /// Parses, renders, embeds and persists one model completion.
    pub async fn process_completion(
        &self,
        raw_text: &str,
        request: &GenerationRequest,
    ) -> Result<QuizRecord, PipelineError> {
        let id = Uuid::new_v4();
        let language = request.language;

        let parsed = parse_response(raw_text, language)?;
        tracing::info!(
            quiz_id = %id,
            questions = parsed.question_groups().len(),
            stage = %PipelineStage::Parsed,
            "quiz stage reached"
        );

        let renderer = self.renderer.clone();
        let title = request.title.clone();
        let (parsed, document) = tokio::task::spawn_blocking(move || {
            renderer
                .render(&parsed, &title, parsed.answer_key_raw(), language)
                .map(|document| (parsed, document))
        })
        .await
        .map_err(|e| RenderError::IoFailure(format!("render task failed: {}", e)))??;
        tracing::info!(
            quiz_id = %id,
            pages = document.page_count,
            stage = %PipelineStage::Rendered,
            "quiz stage reached"
        );

        let embedding = match self.embed(&document.text).await {
            Ok(v) => v,
            Err(EmbeddingError::ContentRejected(msg)) => {
                tracing::warn!(quiz_id = %id, error = %msg, "document embedding rejected");
                return Err(PipelineError::ContentRejected(msg));
            }
            Err(EmbeddingError::Transient(msg)) => {
                tracing::warn!(quiz_id = %id, error = %msg, "document embedding failed, storing without vector");
                Vec::new()
            }
        };
        tracing::info!(
            quiz_id = %id,
            dimensions = embedding.len(),
            stage = %PipelineStage::Embedded,
            "quiz stage reached"
        );

        let record = QuizRecord {
            id,
            owner_id: request.owner_id.clone(),
            title: request.title.clone(),
            question_groups: parsed.into_question_groups(),
            document: document.bytes,
            document_text: document.text,
            embedding,
            preview_image: document.preview_image,
            language,
            prompt: request.prompt.clone(),
            created_at: time::now(),
            relevance_score: None,
        };

        self.store.save(&record).await?;
        if record.is_embedded() {
            match tokio::time::timeout(self.settings.call_timeout, self.index.upsert(&record)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(quiz_id = %id, error = %e, "index upsert failed, left for repair")
                }
                Err(_) => tracing::warn!(quiz_id = %id, "index upsert timed out, left for repair"),
            }
        }
        tracing::info!(
            quiz_id = %id,
            embedded = record.is_embedded(),
            stage = %PipelineStage::Persisted,
            "quiz stage reached"
        );

        Ok(record)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::timeout(self.settings.call_timeout, self.embedder.embed(text))
            .await
            .unwrap_or_else(|_| Err(EmbeddingError::Transient("embedding call timed out".to_string())))
    }
}

fn serialize_context(records: &[QuizRecord]) -> String {
    let groups: Vec<&[QuestionGroup]> = records.iter().map(|r| r.question_groups.as_slice()).collect();
    serde_json::to_string(&groups).unwrap_or_default()
}
