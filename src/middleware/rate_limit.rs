use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

#[derive(Debug)]
struct Window {
    start: Instant,
    admitted: u32,
}

/// Fixed one-second window shared by every request through one router.
#[derive(Clone, Debug)]
pub struct RequestLimiter {
    per_second: u32,
    window: Arc<Mutex<Window>>,
}

impl RequestLimiter {
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second: per_second.max(1),
            window: Arc::new(Mutex::new(Window {
                start: Instant::now(),
                admitted: 0,
            })),
        }
    }

    pub fn try_admit(&self) -> bool {
        self.try_admit_at(Instant::now())
    }

    fn try_admit_at(&self, now: Instant) -> bool {
        let mut window = self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if now.duration_since(window.start) >= Duration::from_secs(1) {
            window.start = now;
            window.admitted = 0;
        }
        if window.admitted < self.per_second {
            window.admitted += 1;
            true
        } else {
            false
        }
    }
}

pub async fn limit_requests(
    State(limiter): State<RequestLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.try_admit() {
        tracing::warn!(path = %req.uri().path(), "request rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Too many requests" })),
        )
            .into_response();
    }
    next.run(req).await
}
