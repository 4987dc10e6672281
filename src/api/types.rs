//! Request/response types for the HTTP front door.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// POST `/messages` request body: one inbound user message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRequest {
    pub thread_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub content: String,
}

/// POST `/messages` response: acknowledgement that the message was
/// enqueued onto the prompt queue for the digest worker to pick up.
#[derive(Debug, Clone, Serialize)]
pub struct MessageAccepted {
    pub cycle_id: String,
    pub enqueued_at: DateTime<Utc>,
}

/// GET `/health` response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Client identity extracted by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    pub client_id: String,
}

/// Query parameters for GET `/graph/export`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GraphExportQuery {
    pub min_weight: Option<f32>,
    pub type_filter: Option<String>,
}
