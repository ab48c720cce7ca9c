use crate::models::language::Language;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value as JsonValue;
use std::time::Duration;

pub use crate::services::embed_service::DEFAULT_OPENAI_BASE_URL;
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

/// What the model answers for abusive or off-topic requests.
pub const ACCESS_DENIED: &str = "access denied";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("language model unavailable: {0}")]
    Transient(String),

    #[error("language model call failed: {0}")]
    Failed(String),
}

/// Free-text completion of a fully assembled quiz prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuizModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

pub fn is_access_denied(completion: &str) -> bool {
    completion.trim().eq_ignore_ascii_case(ACCESS_DENIED)
}

const BASIC_QUIZ_EN: &str = r#"You are an experienced teacher who writes multiple-choice quizzes in English.
Write a quiz for the request below and follow this format exactly:

Quiz Title: <short title>

1. <question>
A. <option>
B. <option>
C. <option>
D. <option>

Number the questions 1, 2, 3 and so on. Every question has exactly four options labelled A. to D.
After the last question add the answer key:

Answer Key:
1. <text of the correct option>
2. <text of the correct option>

List the answers in the same order as the questions.
If the request is abusive, harmful or has nothing to do with creating a quiz, reply with exactly: access denied

Request: {request}"#;

const BASIC_QUIZ_BG: &str = r#"Ти си опитен учител, който съставя тестове с избираем отговор на български език.
Състави тест по заявката по-долу, като спазваш точно този формат:

Заглавие на теста: <кратко заглавие>

1. <въпрос>
A. <отговор>
B. <отговор>
C. <отговор>
D. <отговор>

Номерирай въпросите 1, 2, 3 и т.н. Всеки въпрос има точно четири отговора, означени с латинските букви A. до D.
След последния въпрос добави ключа с отговорите:

Ключ за отговори:
1. <текст на верния отговор>
2. <текст на верния отговор>

Подреди отговорите в реда на въпросите.
Ако заявката е обидна, вредна или няма връзка със съставянето на тест, отговори точно: access denied

Заявка: {request}"#;

const CONTEXT_EN: &str = r#"

These questions were already used in earlier quizzes on the same topic. Do not repeat them and do not ask the same thing in other words:
{context}"#;

const CONTEXT_BG: &str = r#"

Тези въпроси вече са използвани в предишни тестове по същата тема. Не ги повтаряй и не задавай същото с други думи:
{context}"#;

fn user_request(question_count: u32, prompt: &str) -> String {
    format!("Generate {} questions. {}", question_count, prompt.trim())
}

/// Prompt for a quiz generated from the request alone.
pub fn basic_quiz_prompt(language: Language, question_count: u32, prompt: &str) -> String {
    let template = match language {
        Language::En => BASIC_QUIZ_EN,
        Language::Bg => BASIC_QUIZ_BG,
    };
    template.replace("{request}", &user_request(question_count, prompt))
}

/// Prompt that also lists previously generated question groups so the model
/// avoids them. `context` is the serialized question groups.
pub fn context_quiz_prompt(
    language: Language,
    question_count: u32,
    prompt: &str,
    context: &str,
) -> String {
    let addendum = match language {
        Language::En => CONTEXT_EN,
        Language::Bg => CONTEXT_BG,
    };
    let mut assembled = basic_quiz_prompt(language, question_count, prompt);
    assembled.push_str(&addendum.replace("{context}", context));
    assembled
}

#[derive(Clone)]
pub struct OpenAiChatClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiChatClient {
    pub fn new(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn chat_openai(&self, payload: JsonValue) -> Result<JsonValue, ModelError> {
        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ModelError::Transient(e.to_string())
                } else {
                    ModelError::Failed(e.to_string())
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let message = format!("OpenAI API error {}: {}", status, text);
            return Err(if is_retryable(status) {
                ModelError::Transient(message)
            } else {
                ModelError::Failed(message)
            });
        }

        res.json()
            .await
            .map_err(|e| ModelError::Failed(format!("invalid OpenAI response body: {}", e)))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl QuizModel for OpenAiChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.7
        });

        let body = self.chat_openai(payload).await?;
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| ModelError::Failed("Invalid OpenAI response format".to_string()))
    }
}
