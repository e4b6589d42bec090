//! Ingress verification
//!
//! Turns a wire [`SignedMessage`] into a [`ConsensusMessage`] the core may
//! process: well-formed view, sender recovered from the signature, sender
//! in the committee. Messages for a later height cannot be checked against
//! a committee yet; they are checked again when replayed from the backlog.

use crate::domain::{Committee, ConsensusMessage, Payload, SignedMessage};
use bft_types::{short_hex, Address, Height, Round};
use std::sync::Arc;
use tracing::warn;

/// Rejection reasons reported back to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngressError {
    #[error("Sender {0} is not a committee member")]
    InvalidSender(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Malformed message: {0}")]
    Malformed(String),
}

/// What ingress checks against: the view most recently published by the
/// event loop.
#[derive(Clone, Debug)]
pub struct View {
    pub height: Height,
    pub round: Round,
    pub committee: Arc<dyn Committee>,
    pub max_round: Round,
}

impl View {
    pub fn is_member(&self, address: &Address) -> bool {
        self.committee.member_by_address(address).is_some()
    }
}

fn check_shape(message: &SignedMessage, max_round: Round) -> Result<(), IngressError> {
    let round = message.payload.round();
    if round < 0 || round > max_round {
        return Err(IngressError::Malformed(format!(
            "round {round} outside 0..={max_round}"
        )));
    }
    if let Payload::Proposal(proposal) = &message.payload {
        if proposal.block.height() != proposal.height {
            return Err(IngressError::Malformed(format!(
                "proposal for height {} carries block {}",
                proposal.height,
                proposal.block.height()
            )));
        }
        if proposal.valid_round < -1 || proposal.valid_round >= proposal.round {
            return Err(IngressError::Malformed(format!(
                "valid round {} not below round {}",
                proposal.valid_round, proposal.round
            )));
        }
        if !proposal.block.payload_matches_root() {
            return Err(IngressError::Malformed(
                "block payload does not match its header".to_string(),
            ));
        }
    }
    Ok(())
}

/// Full ingress check of a wire message against `view`.
///
/// # Errors
/// - `Malformed` for a round outside `0..=max_round` or an inconsistent
///   proposal, including a payload that does not match the signed header
/// - `InvalidSignature` if no sender can be recovered
/// - `InvalidSender` if the message is for the current height and the
///   sender is not in its committee
pub fn verify(message: SignedMessage, view: &View) -> Result<ConsensusMessage, IngressError> {
    check_shape(&message, view.max_round)?;
    let verified = ConsensusMessage::from_signed(message)
        .map_err(|e| IngressError::InvalidSignature(e.to_string()))?;
    if verified.height() == view.height && !view.is_member(&verified.sender()) {
        warn!(message = ?verified, "Rejecting message from non-member");
        return Err(IngressError::InvalidSender(short_hex(&verified.sender())));
    }
    Ok(verified)
}
