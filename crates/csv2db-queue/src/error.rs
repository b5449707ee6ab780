use thiserror::Error;

/// Broker operation errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Could not reach or authenticate with the broker
    #[error("Failed to establish connection to queue service: {0}")]
    Connect(#[source] lapin::Error),

    /// Protocol-level failure on an open connection
    #[error("Queue operation failed: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Queue '{0}' has not been declared")]
    UnknownQueue(String),

    /// The broker or channel has been shut down
    #[error("Queue connection closed")]
    Closed,
}

pub type QueueResult<T> = Result<T, QueueError>;
