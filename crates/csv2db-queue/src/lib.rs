//! csv2db Queue Client
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! The contract both pipelines rely on, plus two brokers that honour it:
//!
//! - [`AmqpClient`]: RabbitMQ over AMQP 0-9-1
//! - [`MemoryBroker`]: in-process broker for tests and local runs
//!
//! # Contract
//!
//! - `declare` is idempotent and creates a durable, shared, non-auto-deleted queue
//! - `publish` sends a persistent message; returning `Ok` is the only confirmation
//! - `consume` yields deliveries at least once: anything not acknowledged
//!   before its connection drops is delivered again
//! - every [`Delivery`] is terminated exactly once by [`Delivery::ack`] or
//!   [`Delivery::reject`]; both take the delivery by value

pub mod amqp;
pub mod client;
pub mod config;
pub mod error;
pub mod memory;

pub use amqp::{AmqpClient, AmqpDelivery};
pub use client::{Delivery, DeliveryStream, QueueClient};
pub use config::{QueueConfig, DEFAULT_QUEUE_NAME};
pub use error::{QueueError, QueueResult};
pub use memory::{MemoryBroker, MemoryDelivery, Termination};
