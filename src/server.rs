use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use std::time::Duration;

use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::api;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::security::rate_limit::{SimpleRateLimiter, rate_limit_middleware};
use crate::session::SessionStore;

/// Build shared state from configuration.
pub fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    let sessions = SessionStore::new(config.store_settings()?);
    let rate_limiter = Arc::new(SimpleRateLimiter::new(
        config.resilience.requests_per_second,
        config.resilience.burst_size,
    ));

    Ok(AppState {
        sessions,
        rate_limiter,
        config,
    })
}

/// Build the router with all middleware applied.
pub fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    // A disabled timeout is a very long one so the layer stack keeps one type.
    let timeout_duration = if config.resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60) // 1 year
    } else {
        Duration::from_secs(config.resilience.request_timeout_secs)
    };

    api::router()
        .fallback_service(
            ServeDir::new(&config.server.static_dir).append_index_html_on_directories(true),
        )
        .layer(DefaultBodyLimit::max(config.resilience.body_limit_bytes))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| {
                let duration = timeout_duration;
                async move {
                    match tokio::time::timeout(duration, next.run(req)).await {
                        Ok(res) => res,
                        Err(_elapsed) => ApiError::timed_out().into_response(),
                    }
                }
            },
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let state = build_state(Arc::clone(&config))?;

    let settings = state.sessions.settings();
    info!(
        name: "sessions.config.loaded",
        ttl_secs = settings.ttl.as_secs(),
        max_images = settings.max_images,
        max_image_bytes = settings.max_image_bytes,
        max_live_sessions = ?settings.max_live_sessions,
        public_base_url = %settings.public_base_url,
        "Session store configured"
    );

    let sweeper = state
        .sessions
        .spawn_sweeper(Duration::from_secs(config.sessions.sweep_interval_secs));

    let app = build_router(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        static_dir = %config.server.static_dir,
        "Server started"
    );

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    info!(name: "server.stopped", "Server stopped");
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {:?}", e);
        std::future::pending::<()>().await;
    }
}
