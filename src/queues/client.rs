//! Redis Streams-backed client for the six named queues.
//!
//! Grounded on the existing `StreamsClient` (XADD/XREAD/XDEL/XTRIM/consumer
//! groups); here XREADGROUP + XACK implement the at-least-once,
//! visibility-timeout consumption pattern §9 calls for: an entry not acked
//! within the timeout is claimed again via `XAUTOCLAIM` at the top of every
//! `dequeue` call, so an abandoned entry is redelivered the next time any
//! consumer polls rather than sitting in the pending list forever.

use super::{config, QueueError, Result};
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

pub struct QueueClient {
    client: Client,
    conn: Option<MultiplexedConnection>,
}

impl QueueClient {
    /// # Errors
    /// Returns [`QueueError::Transient`] if the Redis URL cannot be parsed.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client =
            Client::open(redis_url).map_err(|e| QueueError::Transient(e.to_string()))?;
        Ok(Self { client, conn: None })
    }

    /// # Errors
    /// Returns [`QueueError::Transient`] if the connection attempt fails.
    pub async fn connect(&mut self) -> Result<()> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        self.conn = Some(conn);
        info!("queue client connected");
        Ok(())
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn conn_mut(&mut self) -> Result<&mut MultiplexedConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| QueueError::Transient("not connected".to_string()))
    }

    /// Ensure the consumer group exists; tolerates `BUSYGROUP`.
    ///
    /// # Errors
    /// Returns [`QueueError::Transient`] on any other Redis failure.
    pub async fn ensure_group(&mut self, queue: &str) -> Result<()> {
        let conn = self.conn_mut()?;
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(queue, config::CONSUMER_GROUP, "0")
            .await;
        if let Err(e) = result {
            if !e.to_string().contains("BUSYGROUP") {
                return Err(QueueError::Transient(e.to_string()));
            }
        }
        Ok(())
    }

    /// Enqueue a JSON-serializable payload onto `queue`, at-least-once FIFO.
    ///
    /// # Errors
    /// Returns [`QueueError::Validation`] if serialization fails, or
    /// [`QueueError::Transient`] if the Redis call fails.
    pub async fn enqueue<T: Serialize>(&mut self, queue: &str, payload: &T) -> Result<String> {
        let json = serde_json::to_string(payload)
            .map_err(|e| QueueError::Validation(e.to_string()))?;
        let conn = self.conn_mut()?;
        let id: String = conn
            .xadd(queue, "*", &[("payload", json.as_str())])
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        let _: redis::RedisResult<()> = conn
            .xtrim(
                queue,
                redis::streams::StreamMaxlen::Approx(config::MAXLEN_APPROX),
            )
            .await;
        debug!(queue, id, "enqueued");
        Ok(id)
    }

    /// Claim entries idle for longer than [`config::VISIBILITY_TIMEOUT_MS`]
    /// and reassign them to `consumer`: the redelivery half of the
    /// visibility-timeout pattern. Entries XREADGROUP already handed to a
    /// consumer that crashed or never acked surface here instead of sitting
    /// in the group's pending-entries list indefinitely.
    ///
    /// # Errors
    /// Returns [`QueueError::Transient`] on a Redis failure, or
    /// [`QueueError::Validation`] if a reclaimed payload fails to
    /// deserialize.
    async fn reclaim<T: DeserializeOwned>(
        &mut self,
        queue: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<(String, T)>> {
        let conn = self.conn_mut()?;
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                queue,
                config::CONSUMER_GROUP,
                consumer,
                config::VISIBILITY_TIMEOUT_MS,
                "0-0",
                StreamAutoClaimOptions::default().count(count),
            )
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;

        let mut out = Vec::new();
        for entry in reply.claimed {
            let Some(raw) = entry.map.get("payload") else {
                continue;
            };
            let raw_str = match raw {
                redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
                redis::Value::SimpleString(s) => s.clone(),
                _ => continue,
            };
            match serde_json::from_str::<T>(&raw_str) {
                Ok(value) => out.push((entry.id, value)),
                Err(e) => warn!(queue, id = entry.id, error = %e, "dropping undeserializable reclaimed entry"),
            }
        }
        if !out.is_empty() {
            info!(queue, consumer, reclaimed = out.len(), "reclaimed abandoned entries");
        }
        Ok(out)
    }

    /// Claim up to `count` entries for `consumer`: abandoned entries first
    /// (via [`Self::reclaim`]), then new entries, blocking up to `block_ms`
    /// if none are immediately available.
    ///
    /// # Errors
    /// Returns [`QueueError::Transient`] on a Redis failure, or
    /// [`QueueError::Validation`] if a payload fails to deserialize.
    pub async fn dequeue<T: DeserializeOwned>(
        &mut self,
        queue: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, T)>> {
        self.ensure_group(queue).await?;

        let mut out = self.reclaim(queue, consumer, count).await?;
        if out.len() >= count {
            return Ok(out);
        }

        let conn = self.conn_mut()?;
        let opts = StreamReadOptions::default()
            .group(config::CONSUMER_GROUP, consumer)
            .count(count - out.len())
            .block(block_ms as usize);

        let reply: StreamReadReply = conn
            .xread_options(&[queue], &[">"], &opts)
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                let Some(raw) = entry.map.get("payload") else {
                    continue;
                };
                let raw_str = match raw {
                    redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
                    redis::Value::SimpleString(s) => s.clone(),
                    _ => continue,
                };
                match serde_json::from_str::<T>(&raw_str) {
                    Ok(value) => out.push((entry.id, value)),
                    Err(e) => warn!(queue, id = entry.id, error = %e, "dropping undeserializable entry"),
                }
            }
        }
        Ok(out)
    }

    /// Acknowledge (remove from the pending list) a delivered entry.
    ///
    /// # Errors
    /// Returns [`QueueError::Transient`] on a Redis failure.
    pub async fn ack(&mut self, queue: &str, entry_id: &str) -> Result<()> {
        let conn = self.conn_mut()?;
        let _: i64 = conn
            .xack(queue, config::CONSUMER_GROUP, &[entry_id])
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`QueueError::Transient`] on a Redis failure.
    pub async fn len(&mut self, queue: &str) -> Result<u64> {
        let conn = self.conn_mut()?;
        conn.xlen(queue)
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn new_client_rejects_malformed_url() {
        let result = QueueClient::new("not a url");
        assert!(result.is_err());
    }

    #[test]
    fn fresh_client_is_not_connected() {
        let client = QueueClient::new("redis://127.0.0.1:6379").expect("valid url");
        assert!(!client.is_connected());
    }
}
