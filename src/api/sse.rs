//! SSE frame formatting for the streaming outlet: `event: <name>\ndata:
//! <json>\n\n` over a long-lived GET, fed by [`EventBus::subscribe`]
//! (§4.10, §6).

use crate::queues::EventBus;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tracing::warn;

type SseResult<T> = std::result::Result<T, std::convert::Infallible>;

/// One event published onto a user's channel. `event` is one of
/// `status, message, card, done, drift, tool_followup, response,
/// reminder, task, notification, escalation` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event: String,
    pub data: serde_json::Value,
}

/// Subscribe to `user_id`'s channel and adapt incoming JSON envelopes into
/// SSE frames, dropping (and logging) any that fail to parse.
///
/// # Errors
/// Returns [`crate::queues::QueueError`] if the pub/sub subscription fails.
pub async fn stream_for_user(
    bus: &EventBus,
    user_id: &str,
) -> crate::queues::Result<impl Stream<Item = SseResult<Event>>> {
    let channel = EventBus::user_channel(user_id);
    let rx = bus.subscribe(&channel).await?;
    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            let raw = rx.recv().await?;
            match serde_json::from_str::<StreamEvent>(&raw) {
                Ok(evt) => {
                    let event = Event::default()
                        .event(evt.event)
                        .json_data(evt.data)
                        .unwrap_or_default();
                    return Some((Ok(event), rx));
                }
                Err(e) => {
                    warn!(error = %e, "dropping malformed stream event");
                }
            }
        }
    });
    Ok(stream)
}

/// Wrap a frame stream in an axum SSE response, sending keep-alive pings
/// so intermediaries don't close the connection during quiet periods.
pub fn response<S>(stream: S) -> Sse<S>
where
    S: Stream<Item = SseResult<Event>> + Send + 'static,
{
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_round_trips_through_json() {
        let evt = StreamEvent {
            event: "message".to_string(),
            data: serde_json::json!({"text": "hi"}),
        };
        let json = serde_json::to_string(&evt).expect("serializes");
        let back: StreamEvent = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.event, "message");
    }
}
