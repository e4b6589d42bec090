//! Driving ports (Inbound API)

use crate::domain::SignedMessage;
use crate::engine::CoreSnapshot;
use crate::service::ServiceResult;
use async_trait::async_trait;
use bft_types::Block;

/// What the network layer and the chain see of a running engine.
#[async_trait]
pub trait ConsensusApi: Send + Sync {
    /// Hand over a message received from a peer.
    ///
    /// The sender is recovered from the signature and checked against the
    /// committee before the message is queued.
    ///
    /// # Errors
    /// - `IngressError::InvalidSignature` if recovery fails
    /// - `IngressError::InvalidSender` if the signer is not a member
    /// - `IngressError::Malformed` for rounds outside `0..=max_round`
    async fn submit_message(&self, message: SignedMessage) -> ServiceResult<()>;

    /// Offer a block this validator may propose.
    async fn submit_candidate_block(&self, block: Block) -> ServiceResult<()>;

    /// Report that `block` was written to the chain. Starts the next height.
    async fn notify_block_finalized(&self, block: Block) -> ServiceResult<()>;

    /// Latest published state dump.
    async fn snapshot(&self) -> CoreSnapshot;
}
