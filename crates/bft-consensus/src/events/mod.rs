//! Events layer
//!
//! Everything that can change consensus state arrives as a
//! [`ConsensusEvent`] on one ordered queue, consumed by the service loop.

use crate::domain::ConsensusMessage;
use crate::engine::TimeoutToken;
use bft_types::Block;

#[derive(Clone, Debug)]
pub enum ConsensusEvent {
    /// Message whose sender was recovered and checked at ingress.
    Message(ConsensusMessage),
    /// A scheduled timeout fired.
    Timeout(TimeoutToken),
    /// Block this validator may propose.
    CandidateBlock(Block),
    /// The backend finished writing a decided block.
    BlockFinalized(Block),
    /// A proposal held back for its timestamp, now due.
    Redeliver(ConsensusMessage),
    Shutdown,
}

impl ConsensusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConsensusEvent::Message(_) => "message",
            ConsensusEvent::Timeout(_) => "timeout",
            ConsensusEvent::CandidateBlock(_) => "candidate_block",
            ConsensusEvent::BlockFinalized(_) => "block_finalized",
            ConsensusEvent::Redeliver(_) => "redeliver",
            ConsensusEvent::Shutdown => "shutdown",
        }
    }
}
