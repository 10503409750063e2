//! Axum router construction.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/v1/encrypt", post(handlers::encrypt))
        .route("/v1/decrypt", post(handlers::decrypt))
        .route("/v1/migrate", post(handlers::migrate))
        .route("/v1/rotation", post(handlers::rotation))
        .route("/v1/index-hash", post(handlers::index_hash))
        .route("/v1/records/encrypt", post(handlers::encrypt_record))
        .route("/v1/records/decrypt", post(handlers::decrypt_record))
        .route("/v1/records/migrate", post(handlers::migrate_record))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}
