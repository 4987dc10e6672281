//! HTTP handlers for message submission, the streaming outlet, and graph
//! export.

use axum::{
    extract::{Extension, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use super::{
    rate_limit::{check_rate_limit, RateLimitConfig, RateLimitResult},
    sse,
    types::{AuthenticatedClient, GraphExportQuery, HealthResponse, MessageAccepted, MessageRequest},
    AppState,
};
use crate::core::types::ThreadId;
use crate::memory::types::{CycleType, MessageCycle};
use crate::queues::names;
use crate::workers::digest::DigestJob;

/// GET `/health`.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST `/messages` - enqueue an inbound user message as a root
/// [`MessageCycle`] onto the prompt queue for the digest worker.
///
/// # Errors
/// Returns `StatusCode::TOO_MANY_REQUESTS` if the client is over its rate
/// limit, or `StatusCode::SERVICE_UNAVAILABLE` if Redis or the queue is
/// unreachable.
pub async fn submit_message(
    State(state): State<AppState>,
    Extension(client): Extension<AuthenticatedClient>,
    Json(payload): Json<MessageRequest>,
) -> Result<Json<MessageAccepted>, StatusCode> {
    let mut conn = state
        .redis
        .get_multiplexed_async_connection()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    match check_rate_limit(&mut conn, &client.client_id, &RateLimitConfig::default()).await {
        Ok(RateLimitResult::Exceeded { .. }) => return Err(StatusCode::TOO_MANY_REQUESTS),
        Err(_) => return Err(StatusCode::SERVICE_UNAVAILABLE),
        Ok(RateLimitResult::Allowed { .. }) => {}
    }

    let thread_id = ThreadId(
        payload
            .thread_id
            .parse()
            .map_err(|_| StatusCode::BAD_REQUEST)?,
    );
    let cycle = MessageCycle::root(thread_id, CycleType::User, payload.content);
    let job = DigestJob {
        cycle,
        user_id: payload.user_id,
        channel_id: payload.channel_id,
    };

    let mut queue = state.queue.lock().await;
    queue
        .enqueue(names::PROMPT, &job)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(MessageAccepted {
        cycle_id: job.cycle.cycle_id.to_string(),
        enqueued_at: Utc::now(),
    }))
}

/// GET `/stream/{user_id}` - the long-lived SSE streaming outlet.
///
/// # Errors
/// Returns `StatusCode::SERVICE_UNAVAILABLE` if the pub/sub subscription
/// fails.
pub async fn stream(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let frames = sse::stream_for_user(&state.bus, &user_id)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(sse::response(frames))
}

/// GET `/graph/export` - GraphML dump of the concept relationship graph.
///
/// # Errors
/// Returns `StatusCode::SERVICE_UNAVAILABLE` if no graph store is
/// configured, or `StatusCode::INTERNAL_SERVER_ERROR` on export failure.
pub async fn graph_export(
    State(state): State<AppState>,
    Query(params): Query<GraphExportQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let graph = state.graph.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "graph store not configured".to_string(),
    ))?;

    let xml = graph.export_graphml().await.map_err(|e| {
        tracing::error!(error = %e, "graphml export failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    tracing::info!(
        min_weight = ?params.min_weight,
        type_filter = ?params.type_filter,
        xml_len = xml.len(),
        "graphml export completed"
    );

    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}
