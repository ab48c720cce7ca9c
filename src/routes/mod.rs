pub mod health;
pub mod quiz_generation;
pub mod quiz_retrieval;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn generation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/quiz-generation/basic",
            post(quiz_generation::generate_basic),
        )
        .route(
            "/api/quiz-generation/complex",
            post(quiz_generation::generate_with_context),
        )
}

pub fn retrieval_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/quiz-retrieval/:owner_id/quizzes",
            get(quiz_retrieval::list_quizzes),
        )
        .route(
            "/api/quiz-retrieval/:owner_id/recommendations",
            get(quiz_retrieval::prompt_recommendations),
        )
        .route(
            "/api/quiz-retrieval/quizzes/:id",
            get(quiz_retrieval::get_quiz),
        )
        .route(
            "/api/quiz-retrieval/quizzes/:id/document",
            get(quiz_retrieval::download_document),
        )
}
