pub mod messages;
pub mod presence;
pub mod sync;

use thiserror::Error;

/// Typed outcomes of message-store operations. `NotFound` is a negative
/// acknowledgment surfaced to the requesting client, never a failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no message matches the requested identity")]
    NotFound,
    #[error("durable store failure: {0}")]
    Persistence(anyhow::Error),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Persistence(e)
    }
}
