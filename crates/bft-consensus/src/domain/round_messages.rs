//! Message store for one height
//!
//! [`MessageMap`] holds one [`RoundMessages`] per round in a dense vector
//! indexed by round. Each round keeps at most one proposal and two
//! [`VoteSet`]s. Rounds are never removed within a height; the whole map is
//! reset when the height changes.

use super::error::StoreError;
use super::message::{ConsensusMessage, Payload, Proposal, Vote, VoteKind};
use super::vote_set::{AddOutcome, QuorumCertificate, RecordedVote, VoteSet};
use bft_types::{Address, Hash, Round, Signature, VotingPower};

/// The proposal accepted for a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredProposal {
    pub proposal: Proposal,
    pub sender: Address,
    pub signature: Signature,
    pub verified: bool,
}

impl StoredProposal {
    pub fn value(&self) -> Hash {
        self.proposal.value()
    }

    pub fn to_message(&self) -> ConsensusMessage {
        ConsensusMessage::new(
            Payload::Proposal(self.proposal.clone()),
            self.signature,
            self.sender,
        )
    }
}

/// Result of offering a proposal to a round slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalSlot {
    Stored,
    /// An unverified draft was replaced by a verified copy.
    Upgraded,
    /// The slot already holds a proposal.
    Ignored,
}

/// Messages received for one round.
#[derive(Clone, Debug)]
pub struct RoundMessages {
    round: Round,
    proposal: Option<StoredProposal>,
    prevotes: VoteSet,
    precommits: VoteSet,
}

impl RoundMessages {
    pub fn new(round: Round, committee_size: usize) -> Self {
        Self {
            round,
            proposal: None,
            prevotes: VoteSet::new(VoteKind::Prevote, committee_size),
            precommits: VoteSet::new(VoteKind::Precommit, committee_size),
        }
    }

    pub fn round(&self) -> Round {
        self.round
    }

    /// Set the round's proposal once. A verified copy may replace an
    /// unverified draft of the same value.
    pub fn set_proposal(&mut self, proposal: StoredProposal) -> ProposalSlot {
        let slot = match &self.proposal {
            None => ProposalSlot::Stored,
            Some(existing)
                if !existing.verified
                    && proposal.verified
                    && existing.value() == proposal.value() =>
            {
                ProposalSlot::Upgraded
            }
            Some(_) => return ProposalSlot::Ignored,
        };
        self.proposal = Some(proposal);
        slot
    }

    pub fn proposal(&self) -> Option<&StoredProposal> {
        self.proposal.as_ref()
    }

    pub fn proposal_hash(&self) -> Option<Hash> {
        self.proposal.as_ref().map(StoredProposal::value)
    }

    pub fn is_proposal_verified(&self) -> bool {
        self.proposal.as_ref().is_some_and(|p| p.verified)
    }

    pub fn mark_proposal_verified(&mut self) {
        if let Some(p) = self.proposal.as_mut() {
            p.verified = true;
        }
    }

    pub fn add_vote(&mut self, kind: VoteKind, vote: RecordedVote) -> Result<AddOutcome, StoreError> {
        match kind {
            VoteKind::Prevote => self.prevotes.add(vote),
            VoteKind::Precommit => self.precommits.add(vote),
        }
    }

    pub fn add_prevote(&mut self, vote: RecordedVote) -> Result<AddOutcome, StoreError> {
        self.prevotes.add(vote)
    }

    pub fn add_precommit(&mut self, vote: RecordedVote) -> Result<AddOutcome, StoreError> {
        self.precommits.add(vote)
    }

    pub fn prevotes(&self) -> &VoteSet {
        &self.prevotes
    }

    pub fn precommits(&self) -> &VoteSet {
        &self.precommits
    }

    pub fn votes(&self, kind: VoteKind) -> &VoteSet {
        match kind {
            VoteKind::Prevote => &self.prevotes,
            VoteKind::Precommit => &self.precommits,
        }
    }

    pub fn prevotes_power(&self, value: &Hash) -> VotingPower {
        self.prevotes.power(value)
    }

    pub fn prevotes_total_power(&self) -> VotingPower {
        self.prevotes.total_power()
    }

    pub fn precommits_power(&self, value: &Hash) -> VotingPower {
        self.precommits.power(value)
    }

    pub fn precommits_total_power(&self) -> VotingPower {
        self.precommits.total_power()
    }

    /// Counted precommits for `value`: the committed seal material.
    pub fn precommits_for(&self, value: &Hash) -> Vec<&RecordedVote> {
        self.precommits.votes_for(value)
    }

    pub fn search_quorum(
        &self,
        kind: VoteKind,
        excluded: &Hash,
        quorum: VotingPower,
    ) -> Option<QuorumCertificate> {
        self.votes(kind).search_quorum(excluded, quorum)
    }

    /// Every stored message of the round, proposal first.
    pub fn all_messages(&self, height: bft_types::Height) -> Vec<ConsensusMessage> {
        let mut out = Vec::new();
        if let Some(p) = &self.proposal {
            out.push(p.to_message());
        }
        for (kind, set) in [
            (VoteKind::Prevote, &self.prevotes),
            (VoteKind::Precommit, &self.precommits),
        ] {
            for v in set.all() {
                let vote = Vote {
                    kind,
                    height,
                    round: self.round,
                    value: v.value,
                };
                out.push(ConsensusMessage::new(Payload::Vote(vote), v.signature, v.sender));
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.proposal.is_none() && self.prevotes.is_empty() && self.precommits.is_empty()
    }
}

/// Rounds of the current height, indexed by round number.
#[derive(Clone, Debug)]
pub struct MessageMap {
    rounds: Vec<RoundMessages>,
    committee_size: usize,
    max_round: Round,
}

impl MessageMap {
    pub fn new(committee_size: usize, max_round: Round) -> Self {
        Self {
            rounds: Vec::new(),
            committee_size,
            max_round,
        }
    }

    fn check_round(&self, round: Round) -> Result<usize, StoreError> {
        if round < 0 || round > self.max_round {
            return Err(StoreError::RoundOutOfRange {
                round,
                max_round: self.max_round,
            });
        }
        Ok(round as usize)
    }

    /// The round's slot, creating it (and any lower rounds) if missing.
    pub fn get_or_create(&mut self, round: Round) -> Result<&mut RoundMessages, StoreError> {
        let index = self.check_round(round)?;
        while self.rounds.len() <= index {
            let next = self.rounds.len() as Round;
            self.rounds
                .push(RoundMessages::new(next, self.committee_size));
        }
        Ok(&mut self.rounds[index])
    }

    pub fn get(&self, round: Round) -> Result<Option<&RoundMessages>, StoreError> {
        let index = self.check_round(round)?;
        Ok(self.rounds.get(index))
    }

    /// Drop everything and size the vote sets for a new committee.
    pub fn reset(&mut self, committee_size: usize) {
        self.rounds.clear();
        self.committee_size = committee_size;
    }

    /// Rounds that hold at least one message.
    pub fn rounds(&self) -> impl Iterator<Item = &RoundMessages> {
        self.rounds.iter().filter(|r| !r.is_empty())
    }

    pub fn committee_size(&self) -> usize {
        self.committee_size
    }

    pub fn max_round(&self) -> Round {
        self.max_round
    }

    pub fn all_messages(&self, height: bft_types::Height) -> Vec<ConsensusMessage> {
        self.rounds
            .iter()
            .flat_map(|r| r.all_messages(height))
            .collect()
    }
}
