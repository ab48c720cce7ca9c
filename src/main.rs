use axum::{extract::DefaultBodyLimit, routing::get, Router};
use quizly_backend::config::{get_config, init_config, LogFormat};
use quizly_backend::middleware::{cors::permissive_cors, rate_limit};
use quizly_backend::services::repair_service::DEFAULT_REPAIR_BATCH;
use quizly_backend::{database::pool::create_pool, routes, AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("quizly_backend=info,tower_http=info"));
    let builder = fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;
    init_tracing(config.log_format);

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool)?;

    {
        let repair = app_state.repair_service.clone();
        let interval = config.repair_interval;
        tokio::spawn(async move {
            loop {
                if let Err(e) = repair.run_once(DEFAULT_REPAIR_BATCH).await {
                    tracing::error!(error = ?e, "embedding repair worker error");
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let limiter = rate_limit::RequestLimiter::new(config.public_rps);
    let generation_api = routes::generation_routes().layer(
        axum::middleware::from_fn_with_state(limiter, rate_limit::limit_requests),
    );

    let limiter = rate_limit::RequestLimiter::new(config.public_rps);
    let retrieval_api = routes::retrieval_routes().layer(
        axum::middleware::from_fn_with_state(limiter, rate_limit::limit_requests),
    );

    let app = base_routes
        .merge(generation_api)
        .merge(retrieval_api)
        .with_state(app_state)
        .layer(permissive_cors())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!(
        model_timeout = ?config.model_timeout,
        repair_every = ?config.repair_interval,
        "Server listening on {}",
        addr
    );
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
