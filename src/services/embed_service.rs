use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

// Provider error codes that mean the input itself is not acceptable.
const CONTENT_REJECTION_CODES: &[&str] = &["content_policy_violation", "content_filter", "flagged"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding provider unavailable: {0}")]
    Transient(String),

    #[error("embedding provider rejected the content: {0}")]
    ContentRejected(String),
}

/// Turns text into a fixed-dimension vector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiEmbeddingClient {
    pub fn new(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
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
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        #[derive(serde::Serialize)]
        struct EmbReq<'a> {
            model: &'a str,
            input: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct EmbData {
            embedding: Vec<f32>,
        }
        #[derive(serde::Deserialize)]
        struct EmbResp {
            data: Vec<EmbData>,
        }

        if text.trim().is_empty() {
            tracing::warn!("no text to embed");
            return Ok(Vec::new());
        }

        let body = EmbReq {
            model: &self.model,
            input: text,
        };
        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| EmbeddingError::Transient(format!("embeddings request failed: {}", e)))?;

        let status = resp.status();
        let txt = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_failure(status, &txt));
        }

        let parsed: EmbResp = serde_json::from_str(&txt)
            .map_err(|e| EmbeddingError::Transient(format!("embeddings parse failed: {}", e)))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Transient("embeddings response had no data".into()))
    }
}

/// Sorts a failed provider response into retryable and content-rejected.
///
/// Only an explicit content-policy code in the error body counts as a
/// rejection; every other failure is left for a later retry.
pub fn classify_failure(status: StatusCode, body: &str) -> EmbeddingError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let field = |name: &str| {
        error
            .and_then(|e| e.get(name))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_ascii_lowercase()
    };
    let code = field("code");
    let kind = field("type");

    let rejected = status.is_client_error()
        && CONTENT_REJECTION_CODES
            .iter()
            .any(|c| code == *c || kind == *c);

    if rejected {
        EmbeddingError::ContentRejected(format!("status {}: {}", status.as_u16(), code))
    } else {
        EmbeddingError::Transient(format!("status {}: {}", status.as_u16(), body))
    }
}

pub fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0f32;
    let mut na = 0f32;
    let mut nb = 0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}
