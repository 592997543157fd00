use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cli::config::BrokerSettings;

/// Queue message envelope. The sequence number makes members unique within
/// a queue and gives FIFO tie-breaking among equal priorities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub priority: u8,
    pub body: Value,
}

/// One in-flight delivery. Holding it does not acknowledge anything: the
/// consumer must `ack` (done) or `reject` (requeue) through the broker.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: Envelope,
    pub(crate) member: String,
    pub(crate) score: f64,
}

impl Delivery {
    pub fn body(&self) -> &Value {
        &self.envelope.body
    }
}

/// Task broker contract: durable priority queues with explicit
/// acknowledgement. Injected into workers so tests can substitute
/// an in-memory implementation.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Durably store a task, eligible for delivery ordered by priority
    /// (10 highest) then arrival.
    async fn publish(&self, queue: &str, body: Value, priority: u8) -> Result<()>;

    /// Take the next delivery, if any. The delivery is tracked as in-flight
    /// until acked or rejected; a crashed consumer's deliveries are restored
    /// by [`Broker::recover`].
    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>>;

    /// Permanently remove a handled delivery.
    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()>;

    /// Requeue a failed delivery at its original position.
    async fn reject(&self, queue: &str, delivery: &Delivery) -> Result<()>;

    /// Move stranded in-flight deliveries back into the queue. Called at
    /// process startup so shutdown or a crash never loses tasks.
    async fn recover(&self, queue: &str) -> Result<usize>;

    /// Number of tasks awaiting delivery.
    async fn depth(&self, queue: &str) -> Result<usize>;
}

/// Delivery-order score: lower delivers first. Priorities invert into score
/// bands wide enough that arrival order only breaks ties within a band.
pub(crate) fn score_for(priority: u8, seq: u64) -> f64 {
    const BAND: f64 = 1e12;
    let priority = priority.min(10);
    f64::from(10 - priority) * BAND + seq as f64
}

/// Redis-backed broker: a sorted set per queue for pending tasks, a second
/// sorted set for in-flight deliveries, and a counter for arrival sequence.
pub struct RedisBroker {
    conn: Arc<Mutex<MultiplexedConnection>>,
    max_priority: u8,
    fetch_script: Script,
    reject_script: Script,
    recover_script: Script,
}

impl RedisBroker {
    /// Connect to Redis. Failure here is fatal to the process: a worker
    /// without a broker has nothing to do.
    pub async fn connect(settings: &BrokerSettings) -> Result<Self> {
        let client = Client::open(settings.redis_url.clone())
            .context(format!("Failed to parse Redis URL {}", settings.redis_url))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis broker")?;

        info!(url = %settings.redis_url, "broker connected");

        // Pop the head of the queue and move it into the processing set in
        // one atomic step, so an in-flight task is never only in process memory.
        let fetch_script = Script::new(
            r#"
            local popped = redis.call('ZPOPMIN', KEYS[1])
            if popped[1] == nil then
                return {}
            end
            redis.call('ZADD', KEYS[2], popped[2], popped[1])
            return popped
            "#,
        );

        // Move a member from processing back to pending at its original score.
        let reject_script = Script::new(
            r#"
            local removed = redis.call('ZREM', KEYS[1], ARGV[1])
            if removed > 0 then
                redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
            end
            return removed
            "#,
        );

        // Requeue everything left in the processing set.
        let recover_script = Script::new(
            r#"
            local entries = redis.call('ZRANGE', KEYS[1], 0, -1, 'WITHSCORES')
            local moved = 0
            for i = 1, #entries, 2 do
                redis.call('ZADD', KEYS[2], entries[i + 1], entries[i])
                moved = moved + 1
            end
            redis.call('DEL', KEYS[1])
            return moved
            "#,
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_priority: settings.max_priority.min(10),
            fetch_script,
            reject_script,
            recover_script,
        })
    }

    fn queue_key(queue: &str) -> String {
        format!("crawler:queue:{}", queue)
    }

    fn processing_key(queue: &str) -> String {
        format!("crawler:processing:{}", queue)
    }

    fn seq_key(queue: &str) -> String {
        format!("crawler:seq:{}", queue)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, queue: &str, body: Value, priority: u8) -> Result<()> {
        let mut conn = self.conn.lock().await;

        let seq: u64 = redis::cmd("INCR")
            .arg(Self::seq_key(queue))
            .query_async(&mut *conn)
            .await
            .context("Failed to allocate task sequence number")?;

        let envelope = Envelope { seq, priority: priority.min(self.max_priority), body };
        let member = serde_json::to_string(&envelope).context("Failed to serialize task envelope")?;
        let score = score_for(envelope.priority, seq);

        redis::cmd("ZADD")
            .arg(Self::queue_key(queue))
            .arg(score)
            .arg(&member)
            .query_async::<_, ()>(&mut *conn)
            .await
            .context("Failed to publish task to broker")?;

        debug!(queue, seq, priority = envelope.priority, "task published");

        Ok(())
    }

    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut conn = self.conn.lock().await;

        let popped: Vec<String> = self
            .fetch_script
            .key(Self::queue_key(queue))
            .key(Self::processing_key(queue))
            .invoke_async(&mut *conn)
            .await
            .context("Failed to fetch task from broker")?;

        if popped.len() < 2 {
            return Ok(None);
        }

        let member = popped[0].clone();
        let score: f64 = popped[1]
            .parse()
            .context("Broker returned a non-numeric score")?;
        let envelope: Envelope =
            serde_json::from_str(&member).context("Failed to deserialize task envelope")?;

        debug!(queue, seq = envelope.seq, "task delivered");

        Ok(Some(Delivery { envelope, member, score }))
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        let mut conn = self.conn.lock().await;

        redis::cmd("ZREM")
            .arg(Self::processing_key(queue))
            .arg(&delivery.member)
            .query_async::<_, ()>(&mut *conn)
            .await
            .context("Failed to ack delivery")?;

        debug!(queue, seq = delivery.envelope.seq, "delivery acked");

        Ok(())
    }

    async fn reject(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        let mut conn = self.conn.lock().await;

        self.reject_script
            .key(Self::processing_key(queue))
            .key(Self::queue_key(queue))
            .arg(&delivery.member)
            .arg(delivery.score)
            .invoke_async::<_, i64>(&mut *conn)
            .await
            .context("Failed to reject delivery")?;

        debug!(queue, seq = delivery.envelope.seq, "delivery rejected and requeued");

        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<usize> {
        let mut conn = self.conn.lock().await;

        let moved: i64 = self
            .recover_script
            .key(Self::processing_key(queue))
            .key(Self::queue_key(queue))
            .invoke_async(&mut *conn)
            .await
            .context("Failed to recover in-flight deliveries")?;

        if moved > 0 {
            info!(queue, moved, "recovered stranded deliveries");
        }

        Ok(moved as usize)
    }

    async fn depth(&self, queue: &str) -> Result<usize> {
        let mut conn = self.conn.lock().await;

        let count: usize = redis::cmd("ZCARD")
            .arg(Self::queue_key(queue))
            .query_async(&mut *conn)
            .await
            .context("Failed to read queue depth")?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_scores_lower() {
        assert!(score_for(10, 1) < score_for(5, 1));
        assert!(score_for(8, 100) < score_for(2, 1));
    }

    #[test]
    fn equal_priority_breaks_ties_by_arrival() {
        assert!(score_for(10, 1) < score_for(10, 2));
        assert!(score_for(0, 7) < score_for(0, 8));
    }

    #[test]
    fn delivery_order_for_mixed_publish() {
        // Publish priorities 10, 5, 10: expect first 10, second 10, then 5.
        let mut scored = vec![
            ("first-10", score_for(10, 1)),
            ("the-5", score_for(5, 2)),
            ("second-10", score_for(10, 3)),
        ];
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        let order: Vec<&str> = scored.iter().map(|(name, _)| *name).collect();
        assert_eq!(order, vec!["first-10", "second-10", "the-5"]);
    }

    #[test]
    fn out_of_range_priority_is_clamped() {
        assert_eq!(score_for(200, 1), score_for(10, 1));
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = Envelope {
            seq: 42,
            priority: 8,
            body: serde_json::json!({"url": "https://example.com"}),
        };
        let wire = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.seq, 42);
        assert_eq!(back.priority, 8);
        assert_eq!(back.body["url"], "https://example.com");
    }
}
