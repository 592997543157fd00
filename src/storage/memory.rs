use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::storage::queue::{score_for, Broker, Delivery, Envelope};

#[derive(Default)]
struct QueueState {
    /// Pending members keyed by (inverted priority band, arrival seq) so
    /// iteration order equals delivery order.
    pending: BTreeMap<(u8, u64), String>,
    /// In-flight members and the key they re-enter the queue at on reject.
    processing: HashMap<String, (u8, u64)>,
    next_seq: u64,
}

/// In-memory broker with the same ordering and acknowledgement semantics as
/// [`crate::storage::RedisBroker`]. Test double; not durable.
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, queue: &str, body: Value, priority: u8) -> Result<()> {
        let mut queues = self.queues.lock().expect("broker lock poisoned");
        let state = queues.entry(queue.to_string()).or_default();

        state.next_seq += 1;
        let seq = state.next_seq;
        let priority = priority.min(10);

        let envelope = Envelope { seq, priority, body };
        let member = serde_json::to_string(&envelope).context("Failed to serialize envelope")?;
        state.pending.insert((10 - priority, seq), member);

        Ok(())
    }

    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut queues = self.queues.lock().expect("broker lock poisoned");
        let state = queues.entry(queue.to_string()).or_default();

        let Some((&key, _)) = state.pending.iter().next() else {
            return Ok(None);
        };
        let member = state.pending.remove(&key).expect("pending head vanished");
        state.processing.insert(member.clone(), key);

        let envelope: Envelope =
            serde_json::from_str(&member).context("Failed to deserialize envelope")?;
        let score = score_for(envelope.priority, envelope.seq);

        Ok(Some(Delivery { envelope, member, score }))
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        let mut queues = self.queues.lock().expect("broker lock poisoned");
        let state = queues.entry(queue.to_string()).or_default();
        state.processing.remove(&delivery.member);
        Ok(())
    }

    async fn reject(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        let mut queues = self.queues.lock().expect("broker lock poisoned");
        let state = queues.entry(queue.to_string()).or_default();

        if let Some(key) = state.processing.remove(&delivery.member) {
            state.pending.insert(key, delivery.member.clone());
        }

        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<usize> {
        let mut queues = self.queues.lock().expect("broker lock poisoned");
        let state = queues.entry(queue.to_string()).or_default();

        let stranded: Vec<(String, (u8, u64))> = state.processing.drain().collect();
        let moved = stranded.len();
        for (member, key) in stranded {
            state.pending.insert(key, member);
        }

        Ok(moved)
    }

    async fn depth(&self, queue: &str) -> Result<usize> {
        let queues = self.queues.lock().expect("broker lock poisoned");
        Ok(queues.get(queue).map_or(0, |s| s.pending.len()))
    }
}
