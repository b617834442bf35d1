// ABOUTME: The synchronization transport: reports missing sequence ranges and publishes local data.
// ABOUTME: Subscriptions deliver batches of missing ranges over an unbounded channel.

use std::time::Duration;

use ndnrepo_core::{Data, Name};
use thiserror::Error;
use tokio::sync::mpsc;

/// A contiguous run of sequence numbers a remote producer has published but we have not fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingData {
    /// Producer session prefix; fetch names are `session/<seq>`.
    pub session: Name,
    pub low: u64,
    pub high: u64,
}

impl MissingData {
    /// The Data names covered by this range, in sequence order.
    pub fn names(&self) -> impl Iterator<Item = Name> + '_ {
        (self.low..=self.high).map(|seq| self.session.clone().append_number(seq))
    }
}

/// Receives missing-range batches for one subscription. Dropping it unsubscribes.
pub type MissingRanges = mpsc::UnboundedReceiver<Vec<MissingData>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("sync transport is closed")]
    Closed,
}

pub trait SyncTransport: Send + Sync {
    /// Start receiving missing-range reports for the sync group rooted at `root`.
    fn subscribe(&self, root: &Name) -> MissingRanges;

    /// Publish `payload` as `producer/<seq>` and announce it to the group.
    fn publish(
        &self,
        payload: &[u8],
        freshness: Duration,
        seq: u64,
        producer: &Name,
    ) -> Result<Data, TransportError>;
}
