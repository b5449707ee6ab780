//! Queue client contract

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{QueueError, QueueResult};

/// Lazy sequence of deliveries handed out by [`QueueClient::consume`].
///
/// The stream ends when the broker closes the consumer.
pub type DeliveryStream<D> = BoxStream<'static, Result<D, QueueError>>;

/// One message received from the broker.
///
/// Must be terminated exactly once. Until then the broker counts it as
/// unacknowledged, and redelivers it if the holding connection drops.
#[async_trait]
pub trait Delivery: Send + Sized + 'static {
    /// Broker-assigned identifier, unique per channel
    fn tag(&self) -> u64;

    /// Raw message body
    fn payload(&self) -> &[u8];

    /// Whether the broker has delivered this message before
    fn redelivered(&self) -> bool;

    /// Confirm the message was processed; the broker forgets it.
    async fn ack(self) -> QueueResult<()>;

    /// Refuse the message. With `requeue = false` it is discarded for good.
    async fn reject(self, requeue: bool) -> QueueResult<()>;
}

/// Capability over a durable, named, at-least-once queue.
///
/// Implementations must tolerate concurrent use from every worker.
#[async_trait]
pub trait QueueClient: Send + Sync + 'static {
    type Delivery: Delivery;

    /// Create the queue if absent. Safe to call repeatedly and from many processes.
    async fn declare(&self, queue: &str) -> QueueResult<()>;

    /// Send a persistent message to `queue`.
    async fn publish(&self, queue: &str, payload: &[u8]) -> QueueResult<()>;

    /// Start consuming `queue`.
    async fn consume(&self, queue: &str) -> QueueResult<DeliveryStream<Self::Delivery>>;
}
