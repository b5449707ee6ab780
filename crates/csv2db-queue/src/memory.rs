//! In-process broker
//!
//! Implements the same contract as [`AmqpClient`](crate::AmqpClient):
//! durable-for-the-process named queues, at-least-once delivery and
//! explicit ack/reject. A delivery dropped without being terminated goes
//! back to the queue marked as redelivered, the way a broker treats
//! deliveries on a dropped connection.
//!
//! Every terminal action is recorded so callers can check that each
//! delivery was terminated exactly once.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

use crate::client::{Delivery, DeliveryStream, QueueClient};
use crate::error::{QueueError, QueueResult};

/// How a delivery was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Acked,
    Rejected { requeue: bool },
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Pending>,
    unacked: usize,
    closed: bool,
}

struct Pending {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, QueueState>,
    next_tag: u64,
    terminations: Vec<(u64, Termination)>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    changed: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop handing out deliveries from `queue` once it is drained.
    ///
    /// Open consumer streams end when nothing is ready and every delivery
    /// already handed out has been terminated.
    pub fn close(&self, queue: &str) {
        if let Some(q) = self.inner.lock().queues.get_mut(queue) {
            q.closed = true;
        }
        self.inner.changed.notify_waiters();
    }

    /// Payloads waiting in `queue`, oldest first.
    pub fn ready_messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|p| p.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliveries handed out from `queue` and not yet terminated.
    pub fn unacked(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.unacked)
            .unwrap_or_default()
    }

    /// Every terminal action so far, by delivery tag.
    pub fn terminations(&self) -> Vec<(u64, Termination)> {
        self.inner.lock().terminations.clone()
    }

    fn enqueue(&self, queue: &str, pending: Pending) -> QueueResult<()> {
        {
            let mut state = self.inner.lock();
            let q = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| QueueError::UnknownQueue(queue.to_string()))?;
            q.ready.push_back(pending);
        }
        self.inner.changed.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl QueueClient for MemoryBroker {
    type Delivery = MemoryDelivery;

    async fn declare(&self, queue: &str) -> QueueResult<()> {
        self.inner.lock().queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> QueueResult<()> {
        self.enqueue(
            queue,
            Pending {
                payload: payload.to_vec(),
                redelivered: false,
            },
        )
    }

    async fn consume(&self, queue: &str) -> QueueResult<DeliveryStream<MemoryDelivery>> {
        if !self.inner.lock().queues.contains_key(queue) {
            return Err(QueueError::UnknownQueue(queue.to_string()));
        }

        let broker = self.clone();
        let queue = queue.to_string();
        let stream = futures::stream::unfold((broker, queue), |(broker, queue)| async move {
            let delivery = broker.next_delivery(&queue).await?;
            Some((Ok::<_, QueueError>(delivery), (broker, queue)))
        });
        Ok(stream.boxed())
    }
}

impl MemoryBroker {
    async fn next_delivery(&self, queue: &str) -> Option<MemoryDelivery> {
        loop {
            // Register interest before looking, so a publish in between is not missed.
            let changed = self.inner.changed.notified();
            {
                let mut guard = self.inner.lock();
                let state = &mut *guard;
                let q = state.queues.get_mut(queue)?;
                if let Some(pending) = q.ready.pop_front() {
                    q.unacked += 1;
                    state.next_tag += 1;
                    return Some(MemoryDelivery {
                        tag: state.next_tag,
                        payload: pending.payload,
                        redelivered: pending.redelivered,
                        queue: queue.to_string(),
                        broker: Some(self.clone()),
                    });
                }
                // Outstanding deliveries may still be requeued
                if q.closed && q.unacked == 0 {
                    return None;
                }
            }
            changed.await;
        }
    }

    fn terminate(&self, queue: &str, tag: u64, termination: Termination, payload: Vec<u8>) {
        {
            let mut state = self.inner.lock();
            state.terminations.push((tag, termination));
            if let Some(q) = state.queues.get_mut(queue) {
                q.unacked = q.unacked.saturating_sub(1);
                if termination == (Termination::Rejected { requeue: true }) {
                    q.ready.push_back(Pending {
                        payload,
                        redelivered: true,
                    });
                }
            }
        }
        self.inner.changed.notify_waiters();
    }
}

/// Delivery handed out by [`MemoryBroker`].
pub struct MemoryDelivery {
    tag: u64,
    payload: Vec<u8>,
    redelivered: bool,
    queue: String,
    /// Taken on termination; still present on drop means abandoned
    broker: Option<MemoryBroker>,
}

impl MemoryDelivery {
    fn finish(mut self, termination: Termination) -> QueueResult<()> {
        let broker = self.broker.take().ok_or(QueueError::Closed)?;
        let payload = std::mem::take(&mut self.payload);
        broker.terminate(&self.queue, self.tag, termination, payload);
        Ok(())
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn tag(&self) -> u64 {
        self.tag
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn ack(self) -> QueueResult<()> {
        self.finish(Termination::Acked)
    }

    async fn reject(self, requeue: bool) -> QueueResult<()> {
        self.finish(Termination::Rejected { requeue })
    }
}

impl Drop for MemoryDelivery {
    fn drop(&mut self) {
        let Some(broker) = self.broker.take() else {
            return;
        };
        debug!(delivery_tag = self.tag, "Delivery dropped unterminated, requeueing");
        {
            let mut state = broker.inner.lock();
            if let Some(q) = state.queues.get_mut(&self.queue) {
                q.unacked = q.unacked.saturating_sub(1);
                q.ready.push_back(Pending {
                    payload: std::mem::take(&mut self.payload),
                    redelivered: true,
                });
            }
        }
        broker.inner.changed.notify_waiters();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const QUEUE: &str = "csv2db";

    async fn broker_with(messages: &[&str]) -> MemoryBroker {
        let broker = MemoryBroker::new();
        broker.declare(QUEUE).await.unwrap();
        for m in messages {
            broker.publish(QUEUE, m.as_bytes()).await.unwrap();
        }
        broker
    }

    #[tokio::test]
    async fn test_declare_is_idempotent() {
        let broker = broker_with(&["a"]).await;
        broker.declare(QUEUE).await.unwrap();
        assert_eq!(broker.ready_messages(QUEUE), vec![b"a".to_vec()]);
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_queue_fails() {
        let broker = MemoryBroker::new();
        let err = broker.publish("missing", b"x").await.unwrap_err();
        assert!(matches!(err, QueueError::UnknownQueue(name) if name == "missing"));
        assert!(broker.consume("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_stream_ends_when_closed_and_drained() {
        let broker = broker_with(&["a", "b"]).await;
        broker.close(QUEUE);

        let mut stream = broker.consume(QUEUE).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.payload(), b"a");
        assert_eq!(second.payload(), b"b");
        assert_eq!(broker.unacked(QUEUE), 2);

        first.ack().await.unwrap();
        second.reject(false).await.unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(broker.unacked(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_consumer_waits_for_publish() {
        let broker = broker_with(&[]).await;
        let mut stream = broker.consume(QUEUE).await.unwrap();

        assert!(timeout(Duration::from_millis(20), stream.next()).await.is_err());

        broker.publish(QUEUE, b"late").await.unwrap();
        let delivery = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload(), b"late");
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_requeue_redelivers() {
        let broker = broker_with(&["a"]).await;
        let mut stream = broker.consume(QUEUE).await.unwrap();

        let delivery = stream.next().await.unwrap().unwrap();
        assert!(!delivery.redelivered());
        let first_tag = delivery.tag();
        delivery.reject(true).await.unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert!(again.redelivered());
        assert_ne!(again.tag(), first_tag);
        assert_eq!(again.payload(), b"a");
        again.ack().await.unwrap();

        assert_eq!(
            broker.terminations(),
            vec![
                (first_tag, Termination::Rejected { requeue: true }),
                (first_tag + 1, Termination::Acked)
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_redelivered() {
        let broker = broker_with(&["a"]).await;
        let mut stream = broker.consume(QUEUE).await.unwrap();

        drop(stream.next().await.unwrap().unwrap());
        assert_eq!(broker.unacked(QUEUE), 0);
        assert!(broker.terminations().is_empty());

        let again = stream.next().await.unwrap().unwrap();
        assert!(again.redelivered());
        again.ack().await.unwrap();
    }
}
