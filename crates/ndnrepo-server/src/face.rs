// ABOUTME: The Face abstraction: express an Interest and await the matching Data.
// ABOUTME: Timeouts and negative acknowledgements both surface as FetchError.

use async_trait::async_trait;
use ndnrepo_core::{Data, Interest};
use thiserror::Error;

/// Why an expressed Interest produced no Data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("interest timed out")]
    Timeout,

    #[error("interest nacked: {0}")]
    Nack(String),
}

/// Sends Interests into the network.
///
/// Implementations must resolve within the Interest's lifetime, returning
/// `FetchError::Timeout` if nothing arrives.
#[async_trait]
pub trait Face: Send + Sync {
    async fn express_interest(&self, interest: Interest) -> Result<Data, FetchError>;
}
