//! Zero-capacity hand-off between one dispatcher and a pool of takers
//!
//! Nothing is ever buffered: a taker announces that it is ready by sending
//! a one-shot slot to the dispatcher, and the dispatcher only gives an item
//! away once such a slot is available. The dispatcher therefore blocks until
//! a worker is free, which is the producer's only flow control.
//!
//! Dropping the [`Dispatcher`] closes the channel. Every pending and future
//! [`Taker::take`] then returns `None`.
//!
//! # Cancellation
//!
//! [`Dispatcher::dispatch`] is cancel-safe in the sense that a dropped
//! dispatch never delivers its item. [`Taker::take`] is not: dropping it after
//! the dispatcher filled the slot loses the item, so takers must await it to
//! completion and leave cancellation to the dispatcher.

use tokio::sync::{mpsc, oneshot};

/// Create a hand-off channel for up to `takers` concurrently waiting takers.
pub fn channel<T>(takers: usize) -> (Dispatcher<T>, Taker<T>) {
    let (tx, rx) = mpsc::channel(takers.max(1));
    (Dispatcher { ready: rx }, Taker { ready: tx })
}

/// Sending half, owned by the reader.
pub struct Dispatcher<T> {
    ready: mpsc::Receiver<oneshot::Sender<T>>,
}

impl<T> Dispatcher<T> {
    /// Wait for a ready taker and hand it `item`.
    ///
    /// Gives the item back if every taker is gone.
    pub async fn dispatch(&mut self, mut item: T) -> Result<(), T> {
        while let Some(slot) = self.ready.recv().await {
            match slot.send(item) {
                Ok(()) => return Ok(()),
                // taker went away between asking and receiving
                Err(returned) => item = returned,
            }
        }
        Err(item)
    }
}

/// Receiving half, cloned into every worker.
pub struct Taker<T> {
    ready: mpsc::Sender<oneshot::Sender<T>>,
}

impl<T> Clone for Taker<T> {
    fn clone(&self) -> Self {
        Self {
            ready: self.ready.clone(),
        }
    }
}

impl<T> Taker<T> {
    /// Announce readiness and wait for the next item.
    ///
    /// Returns `None` once the dispatcher has been dropped.
    pub async fn take(&self) -> Option<T> {
        let (slot, item) = oneshot::channel();
        self.ready.send(slot).await.ok()?;
        item.await.ok()
    }
}
