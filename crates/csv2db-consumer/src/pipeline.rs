//! Consumer pipeline
//!
//! Workers share one delivery stream; whoever holds the lock receives the
//! next delivery. Each delivery is decoded, inserted and then terminated
//! exactly once: acknowledged after a successful insert, rejected otherwise.
//!
//! Cancellation is only observed while waiting for a delivery. Once a worker
//! holds one it runs decode, insert and ack/reject to completion.

use csv2db_common::{message, PipelineError, Result};
use csv2db_queue::{Delivery, DeliveryStream, QueueResult};
use futures::stream::{Fuse, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::storage::Sink;

/// What happens to a message whose insert failed.
///
/// Undecodable messages are always discarded; retrying cannot fix them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reject without requeue; the broker drops or dead-letters it
    #[default]
    Discard,
    /// Reject with requeue for another attempt
    Requeue,
}

impl FailurePolicy {
    fn requeue(self) -> bool {
        matches!(self, Self::Requeue)
    }
}

/// Outcome of a consumer run.
///
/// `acknowledged` and `rejected` count terminal actions taken, so
/// `received == acknowledged + rejected` always holds. Broker errors on those
/// actions are counted separately in `terminate_failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
    pub received: usize,
    pub acknowledged: usize,
    pub rejected: usize,
    pub decode_failed: usize,
    pub insert_failed: usize,
    pub terminate_failed: usize,
}

impl ConsumeSummary {
    fn absorb(&mut self, other: ConsumeSummary) {
        self.received += other.received;
        self.acknowledged += other.acknowledged;
        self.rejected += other.rejected;
        self.decode_failed += other.decode_failed;
        self.insert_failed += other.insert_failed;
        self.terminate_failed += other.terminate_failed;
    }
}

/// Drains a delivery stream into a [`Sink`] with a pool of workers.
pub struct ConsumerPipeline<K> {
    sink: Arc<K>,
    worker_count: usize,
    policy: FailurePolicy,
}

impl<K: Sink> ConsumerPipeline<K> {
    pub fn new(sink: Arc<K>, worker_count: usize) -> Self {
        Self {
            sink,
            worker_count,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run until the stream ends or `cancel` fires, then wait for every worker.
    pub async fn run<D: Delivery>(
        &self,
        deliveries: DeliveryStream<D>,
        cancel: CancellationToken,
    ) -> Result<ConsumeSummary> {
        if self.worker_count == 0 {
            return Err(PipelineError::InvalidWorkerCount);
        }

        info!(
            workers = self.worker_count,
            policy = ?self.policy,
            "Starting consumer pipeline"
        );

        // Fused: workers keep polling after the end of the stream.
        let deliveries = Arc::new(Mutex::new(deliveries.fuse()));
        let mut workers = JoinSet::new();
        for id in 1..=self.worker_count {
            let worker = Worker {
                deliveries: Arc::clone(&deliveries),
                sink: Arc::clone(&self.sink),
                policy: self.policy,
                cancel: cancel.clone(),
            };
            workers.spawn(worker.run().instrument(info_span!("consumer_worker", worker = id)));
        }

        let mut summary = ConsumeSummary::default();
        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => summary.absorb(report),
                Err(e) => {
                    error!(error = %e, "Consumer worker failed");
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e.into());
        }

        info!(
            received = summary.received,
            acknowledged = summary.acknowledged,
            rejected = summary.rejected,
            decode_failed = summary.decode_failed,
            insert_failed = summary.insert_failed,
            terminate_failed = summary.terminate_failed,
            cancelled = cancel.is_cancelled(),
            "Consumer pipeline finished"
        );
        Ok(summary)
    }
}

struct Worker<D, K> {
    deliveries: Arc<Mutex<Fuse<DeliveryStream<D>>>>,
    sink: Arc<K>,
    policy: FailurePolicy,
    cancel: CancellationToken,
}

impl<D: Delivery, K: Sink> Worker<D, K> {
    async fn run(self) -> ConsumeSummary {
        debug!("Worker started");
        let mut report = ConsumeSummary::default();

        while let Some(delivery) = self.next_delivery().await {
            self.handle(delivery, &mut report).await;
        }

        debug!(
            received = report.received,
            acknowledged = report.acknowledged,
            rejected = report.rejected,
            "Worker stopped"
        );
        report
    }

    /// Wait for the next delivery; `None` on cancellation, end of stream or
    /// a stream error.
    async fn next_delivery(&self) -> Option<D> {
        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            stream = self.deliveries.lock() => stream,
        };
        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(delivery)) => Some(delivery),
            Some(Err(e)) => {
                error!(error = %e, "Delivery stream failed");
                None
            }
            None => {
                debug!("Delivery stream closed");
                None
            }
        }
    }

    async fn handle(&self, delivery: D, report: &mut ConsumeSummary) {
        report.received += 1;
        let tag = delivery.tag();
        debug!(delivery_tag = tag, redelivered = delivery.redelivered(), "Received");

        let message = match message::decode(delivery.payload()) {
            Ok(message) => message,
            Err(e) => {
                warn!(delivery_tag = tag, error = %e, "Discarding undecodable message");
                report.decode_failed += 1;
                report.rejected += 1;
                record_termination(delivery.reject(false).await, tag, report);
                return;
            }
        };

        match self.sink.insert(&message).await {
            Ok(()) => {
                report.acknowledged += 1;
                record_termination(delivery.ack().await, tag, report);
            }
            Err(e) => {
                let requeue = self.policy.requeue();
                error!(delivery_tag = tag, requeue, error = %e, "Failed to store message");
                report.insert_failed += 1;
                report.rejected += 1;
                record_termination(delivery.reject(requeue).await, tag, report);
            }
        }
    }
}

fn record_termination(result: QueueResult<()>, tag: u64, report: &mut ConsumeSummary) {
    if let Err(e) = result {
        error!(delivery_tag = tag, error = %e, "Failed to terminate delivery");
        report.terminate_failed += 1;
    }
}
