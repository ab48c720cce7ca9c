use axum::http::header;
use tower_http::cors::{Any, CorsLayer};

/// Any origin may call the API; the download filename header is readable by
/// browser clients.
pub fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any)
        .expose_headers([header::CONTENT_DISPOSITION])
}
