//! Process-local broker with peek-lock, redelivery, duplicate detection, and dead-lettering.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Delivery, OutboundMessage, QueueConsumer, QueueError, QueueTransport};

/// How long a message id is remembered for duplicate detection unless overridden.
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Message that exhausted its delivery budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Transport-level message id.
    pub message_id: String,
    /// Original body.
    pub body: Vec<u8>,
    /// Deliveries attempted before dead-lettering.
    pub delivery_count: u32,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: Vec<u8>,
    delivery_count: u32,
}

/// Message ids accepted within the trailing duplicate-detection window, oldest first.
#[derive(Default)]
struct SeenIds {
    accepted_at: HashMap<String, Instant>,
    order: VecDeque<(Instant, String)>,
}

impl SeenIds {
    /// Record `id` at `now`; `false` if it was already accepted within `window`.
    fn admit(&mut self, id: &str, now: Instant, window: Duration) -> bool {
        while let Some((at, _)) = self.order.front()
            && now.duration_since(*at) >= window
        {
            if let Some((at, expired)) = self.order.pop_front()
                && self.accepted_at.get(&expired) == Some(&at)
            {
                self.accepted_at.remove(&expired);
            }
        }
        if self.accepted_at.contains_key(id) {
            return false;
        }
        self.accepted_at.insert(id.to_string(), now);
        self.order.push_back((now, id.to_string()));
        true
    }

    fn len(&self) -> usize {
        self.accepted_at.len()
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    locked: HashMap<String, StoredMessage>,
    dead_letters: Vec<DeadLetter>,
    seen_ids: SeenIds,
}

/// In-memory queue implementing both [`QueueTransport`] and [`QueueConsumer`].
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    max_delivery_count: u32,
    receive_timeout: Duration,
    duplicate_window: Duration,
}

impl InMemoryQueue {
    /// Create a queue that dead-letters after `max_delivery_count` deliveries and waits at most
    /// `receive_timeout` in each receive.
    pub fn new(max_delivery_count: u32, receive_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            max_delivery_count: max_delivery_count.max(1),
            receive_timeout,
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
        }
    }

    /// Remember message ids for `window` instead of [`DEFAULT_DUPLICATE_WINDOW`].
    pub fn with_duplicate_window(mut self, window: Duration) -> Self {
        self.duplicate_window = window;
        self
    }

    /// Message ids currently held for duplicate detection.
    pub fn remembered_ids(&self) -> usize {
        self.lock().seen_ids.len()
    }

    /// Messages that exhausted their delivery budget.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.clone()
    }

    /// Messages waiting for delivery or currently locked by a consumer.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.ready.len() + state.locked.len()
    }

    /// Put a message back on the queue as if the broker redelivered it, bypassing duplicate
    /// detection. Used to simulate at-least-once delivery.
    pub fn redeliver(&self, message: OutboundMessage) {
        self.lock().ready.push_back(StoredMessage {
            message_id: message.message_id,
            body: message.body.into_bytes(),
            delivery_count: 0,
        });
        self.notify.notify_one();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_take(&self) -> Option<Delivery> {
        let mut state = self.lock();
        let mut message = state.ready.pop_front()?;
        message.delivery_count += 1;
        let lock_token = Uuid::new_v4().to_string();
        let delivery = Delivery {
            message_id: message.message_id.clone(),
            body: message.body.clone(),
            delivery_count: message.delivery_count,
            lock_token: lock_token.clone(),
        };
        state.locked.insert(lock_token, message);
        Some(delivery)
    }

    fn release(&self, delivery: &Delivery) -> Result<StoredMessage, QueueError> {
        self.lock()
            .locked
            .remove(&delivery.lock_token)
            .ok_or_else(|| QueueError::LockLost(delivery.message_id.clone()))
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn send(&self, message: OutboundMessage) -> Result<(), QueueError> {
        {
            let mut state = self.lock();
            if !state
                .seen_ids
                .admit(&message.message_id, Instant::now(), self.duplicate_window)
            {
                tracing::debug!(
                    message_id = %message.message_id,
                    "Duplicate message id suppressed by broker"
                );
                return Ok(());
            }
            state.ready.push_back(StoredMessage {
                message_id: message.message_id,
                body: message.body.into_bytes(),
                delivery_count: 0,
            });
        }
        self.notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for InMemoryQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + self.receive_timeout;
        loop {
            if let Some(delivery) = self.try_take() {
                return Ok(Some(delivery));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || tokio::time::timeout(remaining, self.notify.notified())
                    .await
                    .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.release(delivery)?;
        Ok(())
    }

    async fn abandon(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let message = self.release(delivery)?;
        if message.delivery_count >= self.max_delivery_count {
            tracing::warn!(
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                "Message exceeded max delivery count; moved to dead-letter"
            );
            self.lock().dead_letters.push(DeadLetter {
                message_id: message.message_id,
                body: message.body,
                delivery_count: message.delivery_count,
            });
        } else {
            self.lock().ready.push_back(message);
            self.notify.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> OutboundMessage {
        OutboundMessage {
            message_id: id.into(),
            content_type: "application/json".into(),
            body: format!("{{\"id\":\"{id}\"}}"),
        }
    }

    #[tokio::test]
    async fn duplicate_message_ids_are_suppressed() {
        let queue = InMemoryQueue::new(3, Duration::from_millis(10));
        queue.send(message("m-1")).await.expect("send");
        queue.send(message("m-1")).await.expect("send");
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_detection_forgets_ids_outside_the_window() {
        let queue = InMemoryQueue::new(3, Duration::from_millis(10))
            .with_duplicate_window(Duration::from_secs(60));
        queue.send(message("m-1")).await.expect("send");

        tokio::time::advance(Duration::from_secs(59)).await;
        queue.send(message("m-1")).await.expect("send");
        queue.send(message("m-2")).await.expect("send");
        assert_eq!(queue.pending(), 2);

        tokio::time::advance(Duration::from_secs(1)).await;
        queue.send(message("m-1")).await.expect("send");
        assert_eq!(queue.pending(), 3);
        assert_eq!(queue.remembered_ids(), 2);

        tokio::time::advance(Duration::from_secs(120)).await;
        queue.send(message("m-3")).await.expect("send");
        assert_eq!(queue.remembered_ids(), 1);
    }

    #[tokio::test]
    async fn completed_messages_leave_the_queue() {
        let queue = InMemoryQueue::new(3, Duration::from_millis(10));
        queue.send(message("m-1")).await.expect("send");

        let delivery = queue.receive().await.expect("receive").expect("message");
        assert_eq!(delivery.delivery_count, 1);
        queue.complete(&delivery).await.expect("complete");

        assert_eq!(queue.pending(), 0);
        assert!(queue.receive().await.expect("receive").is_none());
        assert!(matches!(
            queue.complete(&delivery).await,
            Err(QueueError::LockLost(_))
        ));
    }

    #[tokio::test]
    async fn abandoned_messages_are_redelivered_then_dead_lettered() {
        let queue = InMemoryQueue::new(2, Duration::from_millis(10));
        queue.send(message("m-1")).await.expect("send");

        let first = queue.receive().await.expect("receive").expect("message");
        queue.abandon(&first).await.expect("abandon");
        let second = queue.receive().await.expect("receive").expect("message");
        assert_eq!(second.delivery_count, 2);
        queue.abandon(&second).await.expect("abandon");

        assert!(queue.receive().await.expect("receive").is_none());
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message_id, "m-1");
        assert_eq!(dead[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn receive_wakes_when_a_message_arrives() {
        let queue = std::sync::Arc::new(InMemoryQueue::new(3, Duration::from_secs(5)));
        let consumer = queue.clone();
        let handle = tokio::spawn(async move { consumer.receive().await });

        tokio::task::yield_now().await;
        queue.send(message("m-2")).await.expect("send");

        let delivery = handle.await.expect("join").expect("receive").expect("message");
        assert_eq!(delivery.message_id, "m-2");
    }
}
