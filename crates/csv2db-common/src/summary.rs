//! Run totals

/// Outcome of a producer run.
///
/// Every dispatched row is counted exactly once as published, rejected or
/// failed to publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProduceSummary {
    pub dispatched: usize,
    pub published: usize,
    pub rejected: usize,
    pub publish_failed: usize,
    /// The run stopped early on cancellation
    pub cancelled: bool,
}

impl ProduceSummary {
    /// Rows handed to a worker that were not published.
    pub fn unpublished(&self) -> usize {
        self.rejected + self.publish_failed
    }

    /// Whether every dispatched row has been accounted for.
    pub fn is_balanced(&self) -> bool {
        self.dispatched == self.published + self.unpublished()
    }
}
