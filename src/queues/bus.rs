//! Fan-out pub/sub bus for `user:<id>:events` (§4.1, §4.10).
//!
//! Unlike the named queues, this is not a durable log: on publisher
//! failure messages are dropped, and a subscriber only receives events
//! published after it subscribes. Built on Redis Pub/Sub rather than
//! Streams because streaming-outlet consumers want fan-out-and-forget, not
//! an ack'd durable log.

use super::{QueueError, Result};
use redis::{AsyncCommands, Client};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct EventBus {
    client: Client,
}

impl EventBus {
    /// # Errors
    /// Returns [`QueueError::Transient`] if the Redis URL cannot be parsed.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client =
            Client::open(redis_url).map_err(|e| QueueError::Transient(e.to_string()))?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn user_channel(user_id: &str) -> String {
        format!("user:{user_id}:events")
    }

    /// Publish a JSON-serializable event to a channel. Ordering is
    /// preserved within a single channel (Redis Pub/Sub guarantee).
    ///
    /// # Errors
    /// Returns [`QueueError::Transient`] if the publish fails, or
    /// [`QueueError::Validation`] if serialization fails.
    pub async fn publish<T: Serialize>(&self, channel: &str, event: &T) -> Result<()> {
        let json =
            serde_json::to_string(event).map_err(|e| QueueError::Validation(e.to_string()))?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        let receivers: i64 = conn
            .publish(channel, json)
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        debug!(channel, receivers, "published event");
        Ok(())
    }

    /// Subscribe to a channel, returning an `mpsc::Receiver` of raw JSON
    /// strings fed by a background task. Dropping the receiver cancels the
    /// subscription.
    ///
    /// # Errors
    /// Returns [`QueueError::Transient`] if the pub/sub connection fails.
    pub async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>> {
        let pubsub_conn = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        let (tx, rx) = mpsc::channel(256);
        let channel = channel.to_string();

        tokio::spawn(async move {
            let mut pubsub_conn = pubsub_conn;
            if let Err(e) = pubsub_conn.subscribe(&channel).await {
                warn!(error = %e, channel, "subscribe failed");
                return;
            }
            let mut stream = pubsub_conn.on_message();
            use futures_util::StreamExt as _;
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if tx.send(payload).await.is_err() {
                    break; // receiver dropped, subscription cancelled
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn user_channel_is_namespaced() {
        assert_eq!(EventBus::user_channel("abc"), "user:abc:events");
    }

    #[test]
    fn new_bus_rejects_malformed_url() {
        assert!(EventBus::new("not a url").is_err());
    }
}
