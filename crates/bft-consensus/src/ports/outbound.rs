//! Driven ports (outbound dependencies)
//!
//! The core never blocks, so every port it calls is synchronous. Adapters
//! that talk to async infrastructure hand work off through channels.

use crate::domain::{
    AggregateSeal, BackendError, Committee, CommitteeError, ConsensusMessage, TendermintState,
    WalError,
};
use crate::engine::TimeoutToken;
use bft_types::{Address, Block, Hash, Height, Round, Signature};
use std::sync::Arc;
use std::time::Duration;

/// Execution collaborator: chain head, block validity, commit and signing.
pub trait Backend: Send + Sync {
    /// Address this validator signs as.
    fn address(&self) -> Address;

    /// Last committed block.
    fn head_block(&self) -> Block;

    /// Check a proposed block.
    ///
    /// `BackendError::FutureBlock(delay)` means the block becomes valid after
    /// `delay`; `BackendError::KnownBlock` means it is already committed.
    fn verify_proposal(&self, block: &Block) -> Result<(), BackendError>;

    /// Hand a decided block and its seal over for finalization.
    fn commit(&self, block: &Block, round: Round, seal: AggregateSeal) -> Result<(), BackendError>;

    /// Sign a message digest.
    fn sign(&self, digest: &Hash) -> Result<Signature, BackendError>;
}

/// Supplies the committee deciding the block after `parent`.
///
/// Called once per height. Returning a new snapshot replaces the previous
/// one; snapshots are never mutated in place.
pub trait CommitteeProvider: Send + Sync {
    fn committee_for(&self, parent: &Block) -> Result<Arc<dyn Committee>, CommitteeError>;
}

/// Gossip collaborator.
pub trait Broadcaster: Send + Sync {
    /// Send a message to the rest of the committee. The core delivers its
    /// own messages to itself, so adapters need not loop them back.
    fn broadcast(&self, message: &ConsensusMessage);
}

/// Cancellable handle to one scheduled timeout.
pub trait TimerHandle: Send {
    /// Cancel the timer. Returns `false` if it already fired.
    fn cancel(&self) -> bool;

    fn has_fired(&self) -> bool;
}

/// Clock that turns a token into an event after a delay.
pub trait TimeoutScheduler: Send + Sync {
    fn schedule(&self, token: TimeoutToken, after: Duration) -> Box<dyn TimerHandle>;
}

/// Everything the WAL holds for one height.
#[derive(Clone, Debug, Default)]
pub struct WalRecord {
    pub state: Option<TendermintState>,
    /// Messages in sequence order.
    pub messages: Vec<(u64, ConsensusMessage)>,
}

/// Write-ahead log mirroring accepted messages and state changes.
pub trait ConsensusWal: Send + Sync {
    /// Append a message under a strictly increasing per-height sequence.
    fn append_message(
        &self,
        height: Height,
        sequence: u64,
        message: &ConsensusMessage,
    ) -> Result<(), WalError>;

    fn save_state(&self, state: &TendermintState) -> Result<(), WalError>;

    fn load(&self, height: Height) -> Result<Option<WalRecord>, WalError>;

    /// Forget everything below `height`.
    fn truncate_below(&self, height: Height) -> Result<(), WalError>;
}
