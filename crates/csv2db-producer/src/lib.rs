//! csv2db Producer
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Reads `name,email` rows from a CSV file, validates them and publishes one
//! JSON message per valid row to the csv2db queue.
//!
//! - [`source`]: lazy, ordered CSV row stream
//! - [`pipeline`]: reader plus worker pool with cooperative cancellation
//! - [`config`]: command line and `FC_PRODUCER_*` environment options

pub mod config;
pub mod pipeline;
pub mod source;

pub use config::ProducerArgs;
pub use csv2db_common::ProduceSummary;
pub use pipeline::ProducerPipeline;
pub use source::{RecordStream, SourceError};
