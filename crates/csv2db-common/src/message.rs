//! Data model and JSON wire codec
//!
//! A [`Record`] is one raw row from the input file. Rows that pass
//! [`validate`](crate::validation::validate) become a [`Message`], which is
//! what travels through the queue as a two-field JSON object:
//!
//! ```json
//! {"name":"Alice","email":"alice@example.com"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// MIME type of an encoded [`Message`].
pub const CONTENT_TYPE: &str = "application/json";

/// One input row before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based line number in the source, used for logging
    pub line: u64,
    /// Raw fields in column order
    pub fields: Vec<String>,
}

impl Record {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }
}

/// Contact published by the producer and persisted by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    pub email: String,
}

impl Message {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Payload could not be turned back into a [`Message`].
#[derive(Error, Debug)]
#[error("Failed to decode message: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Encode a message as a JSON object with keys `name` and `email`, in that order.
pub fn encode(message: &Message) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(message)
}

/// Decode a JSON payload.
///
/// Unknown fields are ignored. Missing or non-string `name`/`email` fail.
pub fn decode(payload: &[u8]) -> Result<Message, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}
