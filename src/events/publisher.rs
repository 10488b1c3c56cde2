use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Topic-based event publisher for the outbound reliability signals
///
/// Every subscriber sees every event; `subscribe_topic` filters by topic on the
/// subscriber side. A slow broadcast subscriber can lag and miss events.
/// Queued subscriptions (`subscribe_topic_queued`) never miss one: `publish`
/// waits for queue room instead.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
    queues: Arc<RwLock<HashMap<String, Vec<mpsc::Sender<PublishedEvent>>>>>,
    capacity: usize,
    stats: Arc<PublisherCounters>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub id: Uuid,
    pub topic: String,
    pub payload: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default)]
struct PublisherCounters {
    published: AtomicU64,
    unobserved: AtomicU64,
}

/// Publisher throughput snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPublisherStats {
    pub published: u64,
    /// Events published while nobody was subscribed
    pub unobserved: u64,
    pub subscribers: usize,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            queues: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            stats: Arc::new(PublisherCounters::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish a payload on a topic
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: Value,
    ) -> Result<(), PublishError> {
        let event = PublishedEvent {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            published_at: chrono::Utc::now(),
        };

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        debug!(topic = %event.topic, event_id = %event.id, "📣 Publishing event");

        let delivered = self.deliver_queued(&event).await;

        // No subscribers is acceptable - signals are fire-and-forget
        if self.sender.send(event).is_err() && delivered == 0 {
            self.stats.unobserved.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Hand `event` to every queued subscription of its topic, waiting for room
    async fn deliver_queued(&self, event: &PublishedEvent) -> usize {
        let queues = match self.queues.read().get(&event.topic) {
            Some(queues) => queues.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut closed = false;
        for queue in &queues {
            if queue.send(event.clone()).await.is_ok() {
                delivered += 1;
            } else {
                closed = true;
            }
        }

        if closed {
            if let Some(queues) = self.queues.write().get_mut(&event.topic) {
                queues.retain(|queue| !queue.is_closed());
            }
            debug!(topic = %event.topic, "Pruned closed queued subscriptions");
        }
        delivered
    }

    /// Serialize and publish a typed payload
    pub async fn publish_serialized<T: serde::Serialize>(
        &self,
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<(), PublishError> {
        let value = serde_json::to_value(payload)?;
        self.publish(topic, value).await
    }

    /// Subscribe to every event
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Run `handler` for every event published on `topic`
    ///
    /// The returned handle owns the listener task; abort it to unsubscribe.
    pub fn subscribe_topic<F, Fut>(&self, topic: impl Into<String>, handler: F) -> JoinHandle<()>
    where
        F: Fn(PublishedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let topic = topic.into();
        let mut receiver = self.sender.subscribe();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.topic == topic => handler(event).await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "Topic subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(topic = %topic, "Event channel closed, subscriber exiting");
                        break;
                    }
                }
            }
        })
    }

    /// Run `handler` for every event published on `topic`, without loss
    ///
    /// Events wait in a bounded queue of the publisher's capacity; when it is
    /// full, `publish` on this topic waits. Abort the returned handle to
    /// unsubscribe.
    pub fn subscribe_topic_queued<F, Fut>(
        &self,
        topic: impl Into<String>,
        handler: F,
    ) -> JoinHandle<()>
    where
        F: Fn(PublishedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let topic = topic.into();
        let (queue, mut receiver) = mpsc::channel(self.capacity.max(1));
        self.queues
            .write()
            .entry(topic.clone())
            .or_default()
            .push(queue);

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                handler(event).await;
            }
            debug!(topic = %topic, "Queued subscription closed");
        })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> EventPublisherStats {
        let queued: usize = self.queues.read().values().map(Vec::len).sum();
        EventPublisherStats {
            published: self.stats.published.load(Ordering::Relaxed),
            unobserved: self.stats.unobserved.load(Ordering::Relaxed),
            subscribers: self.subscriber_count() + queued,
        }
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<PublishError> for crate::error::ReliabilityError {
    fn from(error: PublishError) -> Self {
        crate::error::ReliabilityError::Event(error.to_string())
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(crate::constants::defaults::EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(16);
        publisher
            .publish("alerts.normal", json!({"message": "hello"}))
            .await
            .unwrap();

        let stats = publisher.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.unobserved, 1);
        assert_eq!(stats.subscribers, 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();

        publisher
            .publish("recovery.action", json!({"action": "flush_cache"}))
            .await
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.topic, "recovery.action");
        assert_eq!(event.payload["action"], "flush_cache");
    }

    #[tokio::test]
    async fn test_subscribe_topic_filters_other_topics() {
        let publisher = EventPublisher::new(16);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = publisher.subscribe_topic("alerts.critical", move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.payload);
            }
        });

        publisher.publish("alerts.normal", json!({"n": 1})).await.unwrap();
        publisher.publish("alerts.critical", json!({"n": 2})).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received["n"], 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_queued_subscription_receives_every_event_beyond_capacity() {
        let publisher = EventPublisher::new(4);
        let received = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&received);
        let handle = publisher.subscribe_topic_queued("errors.reported", move |_event| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for n in 0..50 {
            publisher
                .publish("errors.reported", json!({ "n": n }))
                .await
                .unwrap();
        }
        publisher.publish("alerts.normal", json!({})).await.unwrap();

        for _ in 0..200 {
            if received.load(Ordering::SeqCst) == 50 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(received.load(Ordering::SeqCst), 50);
        handle.abort();
    }

    #[tokio::test]
    async fn test_aborted_queued_subscription_is_pruned() {
        let publisher = EventPublisher::new(4);
        let handle = publisher.subscribe_topic_queued("errors.reported", |_event| async {});
        assert_eq!(publisher.stats().subscribers, 1);

        handle.abort();
        let _ = handle.await;

        publisher
            .publish("errors.reported", json!({}))
            .await
            .unwrap();
        let stats = publisher.stats();
        assert_eq!(stats.subscribers, 0);
        assert_eq!(stats.unobserved, 1);
    }
}
