//! HTTP front door: message submission, the SSE streaming outlet, and
//! graph export (§4.10, §4.11, §6). HMAC auth and Redis-backed rate
//! limiting guard every route but `/health`.

pub mod auth;
pub mod handlers;
pub mod rate_limit;
pub mod sse;
pub mod types;

use crate::graph::ConceptGraph;
use crate::queues::{EventBus, QueueClient};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<Mutex<QueueClient>>,
    pub bus: Arc<EventBus>,
    pub graph: Option<Arc<ConceptGraph>>,
    pub redis: redis::Client,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/messages", post(handlers::submit_message))
        .route("/stream/{user_id}", get(handlers::stream))
        .route("/graph/export", get(handlers::graph_export))
        .route_layer(middleware::from_fn(auth::require_auth));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
}
