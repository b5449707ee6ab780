//! Producer pipeline
//!
//! One reader walks the source in order and hands each row to whichever
//! worker is ready. The hand-off holds no buffer, so the reader never runs
//! ahead of the pool. Workers validate, encode and publish; counts are summed
//! once every worker has exited.
//!
//! Cancellation stops the reader between rows. A worker finishes the row it
//! holds (including its publish) and then exits.

use csv2db_common::handoff::{self, Dispatcher, Taker};
use csv2db_common::{message, validation, PipelineError, ProduceSummary, Record, Result};
use csv2db_queue::QueueClient;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Default)]
struct WorkerReport {
    published: usize,
    rejected: usize,
    publish_failed: usize,
}

impl WorkerReport {
    fn add_to(self, summary: &mut ProduceSummary) {
        summary.published += self.published;
        summary.rejected += self.rejected;
        summary.publish_failed += self.publish_failed;
    }
}

/// Fans rows from a source out to a pool of publishing workers.
pub struct ProducerPipeline<Q> {
    queue: Arc<Q>,
    queue_name: String,
    worker_count: usize,
}

impl<Q: QueueClient> ProducerPipeline<Q> {
    pub fn new(queue: Arc<Q>, queue_name: impl Into<String>, worker_count: usize) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            worker_count,
        }
    }

    /// Run until the source is exhausted, fails, or `cancel` fires.
    ///
    /// Returns only after every worker has exited. A read error stops
    /// dispatching; rows already handed out are still processed and the
    /// error carries the resulting [`ProduceSummary`].
    pub async fn run<S, E>(&self, source: S, cancel: CancellationToken) -> Result<ProduceSummary>
    where
        S: Stream<Item = std::result::Result<Record, E>> + Unpin + Send,
        E: Display,
    {
        if self.worker_count == 0 {
            return Err(PipelineError::InvalidWorkerCount);
        }

        info!(
            workers = self.worker_count,
            queue = %self.queue_name,
            "Starting producer pipeline"
        );

        let (mut dispatcher, taker) = handoff::channel(self.worker_count);
        let mut workers = JoinSet::new();
        for id in 1..=self.worker_count {
            let worker = Worker {
                id,
                taker: taker.clone(),
                queue: Arc::clone(&self.queue),
                queue_name: self.queue_name.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.run().instrument(info_span!("producer_worker", worker = id)));
        }
        drop(taker);

        let read = read_rows(source, &mut dispatcher, &cancel).await;
        // Closing the hand-off lets idle workers exit.
        drop(dispatcher);

        let mut summary = ProduceSummary {
            dispatched: read.dispatched,
            cancelled: read.cancelled,
            ..ProduceSummary::default()
        };
        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => report.add_to(&mut summary),
                Err(e) => {
                    error!(error = %e, "Producer worker failed");
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e.into());
        }

        info!(
            dispatched = summary.dispatched,
            published = summary.published,
            rejected = summary.rejected,
            publish_failed = summary.publish_failed,
            cancelled = summary.cancelled,
            "Producer pipeline finished"
        );

        match read.error {
            Some(message) => Err(PipelineError::source_failed(summary, message)),
            None => Ok(summary),
        }
    }
}

#[derive(Debug, Default)]
struct ReadOutcome {
    dispatched: usize,
    cancelled: bool,
    error: Option<String>,
}

async fn read_rows<S, E>(
    mut source: S,
    dispatcher: &mut Dispatcher<Record>,
    cancel: &CancellationToken,
) -> ReadOutcome
where
    S: Stream<Item = std::result::Result<Record, E>> + Unpin,
    E: Display,
{
    let mut outcome = ReadOutcome::default();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome.cancelled = true;
                break;
            }
            next = source.next() => next,
        };

        let record = match next {
            None => break,
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                error!(error = %e, "Failed to read input");
                outcome.error = Some(e.to_string());
                break;
            }
        };

        let line = record.line;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(line, "Cancelled before dispatch");
                outcome.cancelled = true;
                break;
            }
            sent = dispatcher.dispatch(record) => match sent {
                Ok(()) => outcome.dispatched += 1,
                Err(_) => {
                    warn!(line, "No workers left to take rows");
                    break;
                }
            },
        }
    }

    if outcome.cancelled {
        info!(dispatched = outcome.dispatched, "Reader stopped on cancellation");
    } else {
        debug!(dispatched = outcome.dispatched, "Reader finished");
    }
    outcome
}

struct Worker<Q> {
    id: usize,
    taker: Taker<Record>,
    queue: Arc<Q>,
    queue_name: String,
    cancel: CancellationToken,
}

impl<Q: QueueClient> Worker<Q> {
    async fn run(self) -> WorkerReport {
        debug!(worker = self.id, "Worker started");
        let mut report = WorkerReport::default();

        while !self.cancel.is_cancelled() {
            let Some(record) = self.taker.take().await else {
                break;
            };
            self.handle(record, &mut report).await;
        }

        debug!(
            published = report.published,
            rejected = report.rejected,
            publish_failed = report.publish_failed,
            "Worker stopped"
        );
        report
    }

    async fn handle(&self, record: Record, report: &mut WorkerReport) {
        let line = record.line;

        let message = match validation::validate(&record) {
            Ok(message) => message,
            Err(e) => {
                warn!(line, reason = %e.reason, "Skipping invalid row");
                report.rejected += 1;
                return;
            }
        };

        let payload = match message::encode(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(line, error = %e, "Failed to encode message");
                report.publish_failed += 1;
                return;
            }
        };

        match self.queue.publish(&self.queue_name, &payload).await {
            Ok(()) => {
                debug!(line, "Published");
                report.published += 1;
            }
            Err(e) => {
                error!(line, error = %e, "Failed to publish message");
                report.publish_failed += 1;
            }
        }
    }
}
