pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::error::Result;
use crate::services::{
    ai_service::{OpenAiChatClient, QuizModel},
    document_service::DocumentRenderer,
    embed_service::{EmbeddingClient, OpenAiEmbeddingClient},
    pipeline_service::{PipelineSettings, QuizPipeline},
    quiz_store::{PgQuizStore, QuizStore},
    repair_service::IndexRepairService,
    similarity_service::{PgSimilarityIndex, SimilarityIndex},
};
use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: QuizPipeline,
    pub quiz_store: Arc<dyn QuizStore>,
    pub repair_service: IndexRepairService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Result<Self> {
        let config = crate::config::get_config()?;
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        let model = OpenAiChatClient::new(config.openai_api_key.clone(), http_client.clone())
            .with_base_url(&config.openai_base_url)
            .with_model(&config.chat_model)
            .with_timeout(config.model_timeout);
        let embedder = OpenAiEmbeddingClient::new(config.openai_api_key.clone(), http_client)
            .with_base_url(&config.openai_base_url)
            .with_model(&config.embedding_model)
            .with_timeout(config.model_timeout);

        let settings = PipelineSettings {
            relevance_threshold: config.relevance_threshold,
            candidate_pool: config.vector_candidates,
            top_k: config.vector_limit,
            call_timeout: config.model_timeout,
        };

        Ok(Self::from_parts(
            Arc::new(model),
            Arc::new(embedder),
            Arc::new(PgSimilarityIndex::new(pool.clone())),
            Arc::new(PgQuizStore::new(pool)),
            DocumentRenderer::from_font_path(&config.font_path),
            settings,
        ))
    }

    /// Wires the state from explicit collaborators.
    pub fn from_parts(
        model: Arc<dyn QuizModel>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn SimilarityIndex>,
        store: Arc<dyn QuizStore>,
        renderer: DocumentRenderer,
        settings: PipelineSettings,
    ) -> Self {
        let repair_service = IndexRepairService::new(
            embedder.clone(),
            index.clone(),
            store.clone(),
            settings.call_timeout,
        );
        let pipeline = QuizPipeline::new(model, embedder, index, store.clone(), renderer, settings);
        Self {
            pipeline,
            quiz_store: store,
            repair_service,
        }
    }
}
