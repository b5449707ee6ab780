//! csv2db Consumer
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Takes JSON contact messages off the csv2db queue and stores them in the
//! `contacts` table. A message is acknowledged only after its row is
//! committed, so a crash in between leads to redelivery rather than loss.
//!
//! - [`pipeline`]: worker pool over a shared delivery stream
//! - [`storage`]: the [`Sink`] seam and the Postgres implementation
//! - [`config`]: command line and `FC_CONSUMER_*` environment options

pub mod config;
pub mod pipeline;
pub mod storage;

pub use config::{ConsumerArgs, DatabaseConfig};
pub use pipeline::{ConsumeSummary, ConsumerPipeline, FailurePolicy};
pub use storage::{PgSink, Sink, StorageError, StorageResult};
