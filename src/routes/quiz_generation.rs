use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::dto::quiz_dto::{GeneratedQuizResponse, GenerationRequest};
use crate::error::{Error, Result};
use crate::services::ai_service::is_access_denied;
use crate::services::pipeline_service::GenerationMode;
use crate::AppState;

#[axum::debug_handler]
pub async fn generate_basic(
    State(state): State<AppState>,
    Json(payload): Json<GenerationRequest>,
) -> Result<(StatusCode, Json<GeneratedQuizResponse>)> {
    generate(&state, payload, GenerationMode::Basic).await
}

#[axum::debug_handler]
pub async fn generate_with_context(
    State(state): State<AppState>,
    Json(payload): Json<GenerationRequest>,
) -> Result<(StatusCode, Json<GeneratedQuizResponse>)> {
    generate(&state, payload, GenerationMode::WithContext).await
}

async fn generate(
    state: &AppState,
    payload: GenerationRequest,
    mode: GenerationMode,
) -> Result<(StatusCode, Json<GeneratedQuizResponse>)> {
    payload.validate()?;

    let completion = state.pipeline.request_completion(&payload, mode).await?;
    if is_access_denied(&completion.raw_text) {
        tracing::warn!(
            owner_id = payload.owner_id.as_deref().unwrap_or("-"),
            prompt = %payload.prompt,
            "model refused the prompt"
        );
        return Err(Error::BadRequest(
            "The prompt was rejected as unsuitable for quiz generation".to_string(),
        ));
    }

    let record = state
        .pipeline
        .process_completion(&completion.raw_text, &payload)
        .await?;

    let mut response = GeneratedQuizResponse::from(record);
    if mode == GenerationMode::WithContext {
        response = response.with_context_quizzes(completion.context_quizzes);
    }
    Ok((StatusCode::CREATED, Json(response)))
}
