use super::{MAX_REQUEST_BODY_BYTES, SharedBackend, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::post,
};
use std::{path::PathBuf, time::Duration};
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Directory with the browser frontend; `None` serves the API only.
    pub static_dir: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            static_dir: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

pub fn create_app(backend: SharedBackend, options: &AppOptions) -> Router {
    // Configure the router with all API endpoints
    let router = Router::new()
        .route("/api/compress", post(handlers::compress))
        .route("/api/convert", post(handlers::convert))
        .route("/api/resize", post(handlers::resize))
        .route("/api/rotate", post(handlers::rotate))
        .route("/api/watermark", post(handlers::watermark))
        .route("/api/info", post(handlers::info))
        .route("/api/remove-background", post(handlers::remove_background));

    // Everything that is not an API route comes from the frontend directory
    let router = match &options.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        // Apply a layer to limit the maximum size of request bodies
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TimeoutLayer::new(options.request_timeout))
        // Add CORS layer for broader client compatibility
        .layer(CorsLayer::permissive())
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        // Provide the shared state
        .with_state(backend)
}
