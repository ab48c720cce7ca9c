use crate::services::ai_service::ModelError;
use crate::services::pipeline_service::PipelineError;
use crate::services::quiz_store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

fn pipeline_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Parse(_) => StatusCode::BAD_REQUEST,
        PipelineError::ContentRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Model(ModelError::Transient(_)) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Model(ModelError::Failed(_)) => StatusCode::BAD_GATEWAY,
        PipelineError::Render(_) | PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Pipeline(err) => pipeline_status(err),
            Error::Reqwest(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let error_message = match &self {
            Error::BadRequest(msg) | Error::NotFound(msg) => msg.clone(),
            Error::Validation(err) => err.to_string(),
            Error::Pipeline(PipelineError::Render(_) | PipelineError::Storage(_))
            | Error::Store(_)
            | Error::Database(_) => {
                tracing::error!(error = %self, "request failed");
                "An unexpected error occurred".to_string()
            }
            Error::Pipeline(err) => err.to_string(),
            Error::Reqwest(err) => format!("External service error: {}", err),
            _ => {
                tracing::error!(error = %self, "request failed");
                "An unexpected error occurred".to_string()
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::document_service::RenderError;
    use crate::services::parser_service::ParseError;

    #[test]
    fn pipeline_failures_map_to_distinct_statuses() {
        let cases = [
            (PipelineError::Parse(ParseError::NoQuestionsFound), StatusCode::BAD_REQUEST),
            (
                PipelineError::ContentRejected("flagged".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                PipelineError::Model(ModelError::Transient("timeout".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PipelineError::Model(ModelError::Failed("401".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::Render(RenderError::MissingFontResource("font".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(Error::from(err).status_code(), status);
        }
    }

    #[test]
    fn row_not_found_is_not_found() {
        let err = Error::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let err = Error::Pipeline(PipelineError::Storage(StoreError::Serialization(
            "column embedding".into(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
