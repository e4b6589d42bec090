//! Committed seal: the precommit signatures proving quorum on a block

use super::message::{Payload, Vote};
use super::vote_set::RecordedVote;
use bft_types::{Hash, Height, Round, Signature, VotingPower};
use bitvec::prelude::*;

/// Precommits for one value at one round, aggregated for the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateSeal {
    pub height: Height,
    pub round: Round,
    pub value: Hash,
    /// Bit `i` set when committee member `i` signed.
    pub signers: BitVec<u8, Msb0>,
    /// `(committee index, signature)` in committee order.
    pub signatures: Vec<(usize, Signature)>,
    pub power: VotingPower,
}

impl AggregateSeal {
    pub fn from_precommits(
        height: Height,
        round: Round,
        value: Hash,
        committee_size: usize,
        precommits: &[&RecordedVote],
    ) -> Self {
        let mut signers = bitvec![u8, Msb0; 0; committee_size];
        let mut signatures = Vec::with_capacity(precommits.len());
        let mut power: VotingPower = 0;
        for vote in precommits {
            if vote.value != value || vote.index >= committee_size || signers[vote.index] {
                continue;
            }
            signers.set(vote.index, true);
            signatures.push((vote.index, vote.signature));
            power += vote.power;
        }
        signatures.sort_by_key(|(index, _)| *index);
        Self {
            height,
            round,
            value,
            signers,
            signatures,
            power,
        }
    }

    pub fn signer_count(&self) -> usize {
        self.signers.count_ones()
    }

    pub fn has_signed(&self, index: usize) -> bool {
        self.signers.get(index).map(|b| *b).unwrap_or(false)
    }

    /// The payload every seal signature covers.
    pub fn signed_payload(&self) -> Payload {
        Payload::Vote(Vote::precommit(self.height, self.round, self.value))
    }
}
