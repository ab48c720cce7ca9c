use std::env;

use quizly_backend::database::pool::create_pool;
use quizly_backend::models::language::Language;
use quizly_backend::models::quiz::QuizRecord;
use quizly_backend::services::document_service::DocumentRenderer;
use quizly_backend::services::parser_service::parse_response;
use quizly_backend::services::quiz_store::{PgQuizStore, QuizStore};
use quizly_backend::services::similarity_service::{PgSimilarityIndex, SimilarityIndex};
use uuid::Uuid;

const FONT_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/fonts/DejaVuSans.ttf");

fn record(owner: &str, embedding: Vec<f32>) -> QuizRecord {
    let parsed = parse_response(
        "1. Longest river?\nA. Nile\nB. Danube\nC. Volga\nD. Rhine\n\nAnswer Key:\n1. Nile",
        Language::En,
    )
    .expect("parse");
    let document = DocumentRenderer::from_font_path(FONT_PATH)
        .render(&parsed, "Rivers", parsed.answer_key_raw(), Language::En)
        .expect("render");

    QuizRecord {
        id: Uuid::new_v4(),
        owner_id: Some(owner.to_string()),
        title: "Rivers".to_string(),
        question_groups: parsed.into_question_groups(),
        document: document.bytes,
        document_text: document.text,
        embedding,
        preview_image: document.preview_image,
        language: Language::En,
        prompt: "rivers".to_string(),
        created_at: chrono::Utc::now(),
        relevance_score: None,
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn postgres_store_and_index_round_trip() {
    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL");
    let pool = create_pool(&database_url).await.expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let store = PgQuizStore::new(pool.clone());
    let index = PgSimilarityIndex::new(pool);
    let owner = format!("owner-{}", Uuid::new_v4());

    let near = record(&owner, vec![1.0, 0.0, 0.0]);
    let far = record(&owner, vec![0.0, 1.0, 0.0]);
    let pending = record(&owner, Vec::new());
    for r in [&near, &far, &pending] {
        store.save(r).await.expect("save");
    }

    let loaded = store.get(near.id).await.expect("get").expect("present");
    assert_eq!(loaded.question_groups, near.question_groups);
    assert_eq!(loaded.embedding, near.embedding);

    let hits = index
        .query(&[1.0, 0.0, 0.0], Some(&owner), Language::En, 200, 10)
        .await
        .expect("query");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0.id, near.id);
    assert!(hits[0].1 > hits[1].1);

    let page = store.list_by_owner(&owner, 0, 9).await.expect("list");
    assert_eq!(page.total, 3);

    let waiting = store.pending_embeddings(1000).await.expect("pending");
    assert!(waiting.iter().any(|r| r.id == pending.id));
    store
        .mark_embedding_rejected(pending.id)
        .await
        .expect("reject");
    let waiting = store.pending_embeddings(1000).await.expect("pending");
    assert!(waiting.iter().all(|r| r.id != pending.id));

    let top = store.top_prompts(&owner, 10).await.expect("top prompts");
    assert_eq!(top[0].count, 3);
}
