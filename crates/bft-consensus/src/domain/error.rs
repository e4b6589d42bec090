//! Error types for the consensus engine

use bft_types::{Address, CryptoError, EncodingError, Height, Round};
use std::time::Duration;

/// Errors raised while processing a message or event in the core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Proposal for round {round} not sent by its proposer: {sender:?}")]
    NotFromProposer { round: Round, sender: Address },

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    /// The signature covers the header only, so a mismatched payload says
    /// nothing about the proposer.
    #[error("Proposal for round {round} carries a payload that does not match its header")]
    PayloadMismatch { round: Round },

    /// Proposal timestamp is ahead of the local clock. Redeliver later.
    #[error("Proposal block is in the future, retry after {retry_after:?}")]
    FutureBlock { retry_after: Duration },

    #[error("Message store error: {0}")]
    Store(#[from] StoreError),

    #[error("Committee error: {0}")]
    Committee(#[from] CommitteeError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors from the per-height message store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Round {round} outside the stored range 0..={max_round}")]
    RoundOutOfRange { round: Round, max_round: Round },

    #[error("Committee index {index} outside committee of size {size}")]
    IndexOutOfRange { index: usize, size: usize },
}

/// Errors building or querying a committee.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitteeError {
    #[error("Committee has no members")]
    Empty,

    #[error("Duplicate committee member: {0:?}")]
    DuplicateMember(Address),

    #[error("Committee member {0:?} has zero voting power")]
    ZeroPower(Address),

    #[error("No committee available for height {0}")]
    Unavailable(Height),
}

/// Errors reported by the execution backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Block timestamp ahead of local time by `0`.
    #[error("Future block, ready in {0:?}")]
    FutureBlock(Duration),

    /// Block is already part of the local chain.
    #[error("Block already known")]
    KnownBlock,

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl From<CryptoError> for BackendError {
    fn from(e: CryptoError) -> Self {
        BackendError::Signing(e.to_string())
    }
}

/// Timer state errors, handled locally by skipping the dependent action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("Timer already fired")]
    AlreadyFired,

    #[error("Timer not started")]
    NotStarted,
}

/// Write-ahead log errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalError {
    #[error("WAL sequence {got} not after {last} at height {height}")]
    OutOfOrder { height: Height, last: u64, got: u64 },

    #[error("WAL storage error: {0}")]
    Storage(String),
}
