use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::dto::quiz_dto::{PromptRecommendationsResponse, QuizDetailResponse, QuizListQuery};
use crate::error::{Error, Result};
use crate::services::quiz_store::DEFAULT_PROMPT_RECOMMENDATIONS;
use crate::AppState;

pub async fn list_quizzes(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Query(query): Query<QuizListQuery>,
) -> Result<impl IntoResponse> {
    if query.offset().is_none() {
        return Err(Error::BadRequest("page is out of range".to_string()));
    }
    let page = state
        .quiz_store
        .list_by_owner(&owner_id, query.page(), query.size())
        .await?;
    Ok(Json(page))
}

pub async fn prompt_recommendations(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<impl IntoResponse> {
    let prompts = state
        .quiz_store
        .top_prompts(&owner_id, DEFAULT_PROMPT_RECOMMENDATIONS)
        .await?;
    Ok(Json(PromptRecommendationsResponse { owner_id, prompts }))
}

pub async fn get_quiz(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let record = state
        .quiz_store
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound("Quiz not found".into()))?;
    Ok(Json(QuizDetailResponse::from(record)))
}

/// The quiz PDF as an attachment.
pub async fn download_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let record = state
        .quiz_store
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound("Quiz not found".into()))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        document_filename(&record.title, record.id)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        record.document,
    ))
}

// Header values must stay ASCII, so non-ASCII titles fall back to the id.
fn document_filename(title: &str, id: Uuid) -> String {
    let slug: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        format!("quiz_{}.pdf", id)
    } else {
        format!("quiz_{}.pdf", slug)
    }
}
