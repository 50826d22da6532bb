//! HTTP surface: rate limited routes, health check and admin API.

mod error;
mod handlers;
mod middleware;
mod server;

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::ratelimit::RateLimiterBackend;

pub use error::ApiError;
pub use middleware::{enforce_rate_limit, KEY_HEADER, REMAINING_HEADER, RESET_HEADER, USER_HEADER};
pub use server::HttpServer;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// The rate limiter consulted by the middleware and the admin API
    pub limiter: Arc<dyn RateLimiterBackend>,
    /// When the server was started, for the health check
    pub started_at: Instant,
    /// Largest JSON body buffered to look for a user id
    pub body_limit: usize,
}

impl AppState {
    pub fn new(limiter: Arc<dyn RateLimiterBackend>, body_limit: usize) -> Self {
        Self {
            limiter,
            started_at: Instant::now(),
            body_limit,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root).post(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/admin/config/default",
            get(handlers::get_default_config).post(handlers::update_default_config),
        )
        .route("/admin/config/:key", post(handlers::update_key_config))
        .route("/admin/status", get(handlers::status))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// ISO-8601 with millisecond precision, as sent in headers and bodies.
pub(crate) fn to_iso8601(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
