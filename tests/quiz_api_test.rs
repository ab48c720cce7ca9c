use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use quizly_backend::services::ai_service::{ModelError, QuizModel};
use quizly_backend::services::document_service::DocumentRenderer;
use quizly_backend::services::embed_service::{EmbeddingClient, EmbeddingError};
use quizly_backend::services::pipeline_service::PipelineSettings;
use quizly_backend::services::quiz_store::{InMemoryQuizStore, QuizStore};
use quizly_backend::services::similarity_service::InMemorySimilarityIndex;
use quizly_backend::{routes, AppState};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

const FONT_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/fonts/DejaVuSans.ttf");
const TWO_QUESTIONS: &str = "Quiz Title: Letters\n\n1. First letter?\nA. a\nB. b\nC. c\nD. d\n\n2. Last letter?\nA. x\nB. y\nC. z\nD. w\n\nAnswer Key:\n1. a\n2. z";

/// Answers every prompt with the same text and remembers the prompts.
struct ScriptedModel {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl QuizModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl EmbeddingClient for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.0.clone())
    }
}

struct TestApp {
    router: Router,
    store: Arc<InMemoryQuizStore>,
}

fn app_with(model: Arc<ScriptedModel>) -> TestApp {
    app_with_renderer(model, DocumentRenderer::from_font_path(FONT_PATH))
}

fn app_with_renderer(model: Arc<ScriptedModel>, renderer: DocumentRenderer) -> TestApp {
    let store = Arc::new(InMemoryQuizStore::new());
    let state = AppState::from_parts(
        model,
        Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])),
        Arc::new(InMemorySimilarityIndex::new()),
        store.clone(),
        renderer,
        PipelineSettings::default(),
    );

    let router = Router::new()
        .route("/health", get(routes::health::health))
        .merge(routes::generation_routes())
        .merge(routes::retrieval_routes())
        .with_state(state);

    TestApp { router, store }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(router: &Router, req: Request<Body>) -> (StatusCode, JsonValue) {
    let (status, bytes) = send(router, req).await;
    let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, json)
}

fn post_json(uri: &str, body: JsonValue) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn generation_body(owner: &str, prompt: &str) -> JsonValue {
    json!({
        "title": "Letters",
        "question_count": 2,
        "prompt": prompt,
        "language": "en",
        "owner_id": owner
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app_with(ScriptedModel::new(TWO_QUESTIONS));
    let (status, body) = send_json(&app.router, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn basic_generation_then_retrieval() {
    let app = app_with(ScriptedModel::new(TWO_QUESTIONS));

    let (status, created) = send_json(
        &app.router,
        post_json("/api/quiz-generation/basic", generation_body("u1", "alphabet")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["question_groups"].as_array().unwrap().len(), 2);
    assert_eq!(created["question_groups"][1]["answer"], "z");
    assert_eq!(created["embedded"], true);
    assert!(created["preview_image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert!(created.get("context_quizzes").is_none());

    let id = created["id"].as_str().unwrap().to_string();

    let (status, detail) = send_json(
        &app.router,
        get_req(&format!("/api/quiz-retrieval/quizzes/{}", id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["prompt"], "alphabet");
    assert!(detail.get("embedding").is_none());

    let res = app
        .router
        .clone()
        .oneshot(get_req(&format!("/api/quiz-retrieval/quizzes/{}/document", id)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/pdf");
    assert!(res.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("quiz_Letters.pdf"));
    let pdf = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    let (status, page) = send_json(&app.router, get_req("/api/quiz-retrieval/u1/quizzes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["per_page"], 9);
    assert_eq!(page["items"][0]["id"], id.as_str());
}

#[tokio::test]
async fn access_denied_completion_is_rejected_and_not_stored() {
    let app = app_with(ScriptedModel::new("  Access denied \n"));

    let (status, body) = send_json(
        &app.router,
        post_json("/api/quiz-generation/basic", generation_body("u1", "something rude")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("rejected"));
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn unparseable_completion_is_a_bad_request() {
    let app = app_with(ScriptedModel::new("Here are some thoughts about rivers."));

    let (status, body) = send_json(
        &app.router,
        post_json("/api/quiz-generation/basic", generation_body("u1", "rivers")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn invalid_question_count_is_rejected_before_the_model() {
    let model = ScriptedModel::new(TWO_QUESTIONS);
    let app = app_with(model.clone());

    let mut body = generation_body("u1", "rivers");
    body["question_count"] = json!(101);
    let (status, _) = send_json(&app.router, post_json("/api/quiz-generation/basic", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(model.last_prompt().is_none());
}

#[tokio::test]
async fn complex_generation_uses_prior_quizzes_as_context() {
    let model = ScriptedModel::new(TWO_QUESTIONS);
    let app = app_with(model.clone());

    let (status, _) = send_json(
        &app.router,
        post_json("/api/quiz-generation/basic", generation_body("u1", "alphabet")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, created) = send_json(
        &app.router,
        post_json("/api/quiz-generation/complex", generation_body("u1", "alphabet")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["context_quizzes"], 1);
    assert!(model.last_prompt().unwrap().contains("First letter?"));

    // another owner's quizzes never leak into the context
    let (status, created) = send_json(
        &app.router,
        post_json("/api/quiz-generation/complex", generation_body("u2", "alphabet")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["context_quizzes"], 0);
}

#[tokio::test]
async fn recommendations_rank_prompts_by_frequency() {
    let app = app_with(ScriptedModel::new(TWO_QUESTIONS));
    for prompt in ["rivers", "alphabet", "rivers"] {
        let (status, _) = send_json(
            &app.router,
            post_json("/api/quiz-generation/basic", generation_body("u1", prompt)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send_json(
        &app.router,
        get_req("/api/quiz-retrieval/u1/recommendations"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompts"][0]["prompt"], "rivers");
    assert_eq!(body["prompts"][0]["count"], 2);
    assert_eq!(body["prompts"][1]["prompt"], "alphabet");
}

#[tokio::test]
async fn unknown_quiz_is_not_found() {
    let app = app_with(ScriptedModel::new(TWO_QUESTIONS));
    let (status, body) = send_json(
        &app.router,
        get_req(&format!("/api/quiz-retrieval/quizzes/{}", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Quiz not found");
}

#[tokio::test]
async fn paging_parameters_are_honoured() {
    let app = app_with(ScriptedModel::new(TWO_QUESTIONS));
    for _ in 0..3 {
        send_json(
            &app.router,
            post_json("/api/quiz-generation/basic", generation_body("u1", "rivers")),
        )
        .await;
    }
    let stored = app.store.list_by_owner("u1", 0, 10).await.unwrap();
    assert_eq!(stored.total, 3);

    let (status, page) = send_json(
        &app.router,
        get_req("/api/quiz-retrieval/u1/quizzes?page=1&size=2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["total_pages"], 2);
}

#[tokio::test]
async fn page_beyond_offset_range_is_a_bad_request() {
    let app = app_with(ScriptedModel::new(TWO_QUESTIONS));
    let (status, body) = send_json(
        &app.router,
        get_req("/api/quiz-retrieval/u1/quizzes?page=9223372036854775807"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("page"));

    let (status, page) = send_json(
        &app.router,
        get_req("/api/quiz-retrieval/u1/quizzes?page=1000000&size=9"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn missing_font_is_a_server_error_and_nothing_is_stored() {
    let app = app_with_renderer(
        ScriptedModel::new(TWO_QUESTIONS),
        DocumentRenderer::from_font_path("/nonexistent/fonts/Missing.ttf"),
    );

    let (status, body) = send_json(
        &app.router,
        post_json("/api/quiz-generation/basic", generation_body("u1", "alphabet")),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["error"].as_str().unwrap().contains("Missing.ttf"));
    assert!(app.store.is_empty().await);
}
