//! csv2db Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the csv2db producer and
//! consumer.
//!
//! # Overview
//!
//! - **Data model**: [`Record`] rows read from input and the [`Message`] published to the queue
//! - **Codec**: JSON wire encoding of [`Message`]
//! - **Validation**: row checks applied before publishing
//! - **Hand-off**: zero-capacity rendezvous channel between a reader and a worker pool
//! - **Shutdown**: process signals wired to a cancellation token
//! - **Logging**: centralized `tracing` setup
//! - **Config**: `.env` loading and worker-count defaults
//! - **Summary**: producer run totals, also carried by a failed run
//!
//! # Example
//!
//! ```
//! use csv2db_common::{message, validation, Record};
//!
//! let record = Record::new(1, vec!["Alice".into(), "alice@example.com".into()]);
//! let msg = validation::validate(&record).unwrap();
//! let bytes = message::encode(&msg).unwrap();
//! assert_eq!(message::decode(&bytes).unwrap(), msg);
//! ```

pub mod config;
pub mod error;
pub mod handoff;
pub mod logging;
pub mod message;
pub mod shutdown;
pub mod summary;
pub mod validation;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use message::{DecodeError, Message, Record};
pub use summary::ProduceSummary;
pub use validation::{RejectReason, ValidationError};
