use thiserror::Error;

use common::DerivativeFailureReason;

/// Worker-side errors.
///
/// `Stage` is a domain failure carrying the reason the server records on the
/// asset's failure row; `Queue` is infrastructure and goes through the retry
/// tracker instead.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{reason}: {detail}")]
    Stage {
        reason: DerivativeFailureReason,
        detail: String,
    },

    #[error("Queue error: {0}")]
    Queue(String),
}

impl WorkerError {
    pub fn stage(reason: DerivativeFailureReason, detail: impl Into<String>) -> Self {
        Self::Stage {
            reason,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
