//! Serialisable state dump for observers and debugging

use super::Core;
use crate::domain::{RoundMessages, Step};
use bft_types::{Address, Hash, Height, Round, VotingPower};
use serde::{Deserialize, Serialize};

/// Vote tally and proposal of one round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round: Round,
    pub proposal: Option<Hash>,
    pub proposal_verified: bool,
    /// `(value, power)` sorted by value; nil appears as the zero hash.
    pub prevotes: Vec<(Hash, VotingPower)>,
    pub precommits: Vec<(Hash, VotingPower)>,
    pub prevote_power: VotingPower,
    pub precommit_power: VotingPower,
    pub equivocations: usize,
}

impl RoundSnapshot {
    fn of(rm: &RoundMessages) -> Self {
        Self {
            round: rm.round(),
            proposal: rm.proposal_hash(),
            proposal_verified: rm.is_proposal_verified(),
            prevotes: rm.prevotes().tally(),
            precommits: rm.precommits().tally(),
            prevote_power: rm.prevotes_total_power(),
            precommit_power: rm.precommits_total_power(),
            equivocations: rm.prevotes().equivocations().len()
                + rm.precommits().equivocations().len(),
        }
    }
}

/// A point-in-time copy of the core's view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSnapshot {
    pub address: Address,
    pub height: Height,
    pub round: Round,
    pub step: Step,
    pub locked_round: Round,
    pub locked_value: Option<Hash>,
    pub valid_round: Round,
    pub valid_value: Option<Hash>,
    pub proposer: Address,
    pub is_proposer: bool,
    pub committee_size: usize,
    pub quorum: VotingPower,
    pub rounds: Vec<RoundSnapshot>,
    /// Distinct-sender power observed per future round.
    pub future_round_power: Vec<(Round, VotingPower)>,
    pub propose_timer_started: bool,
    pub prevote_timer_started: bool,
    pub precommit_timer_started: bool,
    /// Messages buffered outside the core; filled in by the service.
    pub backlog_len: usize,
}

impl CoreSnapshot {
    pub fn round_snapshot(&self, round: Round) -> Option<&RoundSnapshot> {
        self.rounds.iter().find(|r| r.round == round)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Core {
    pub fn snapshot(&self) -> CoreSnapshot {
        let round = self.state.round();
        CoreSnapshot {
            address: self.address,
            height: self.state.height(),
            round,
            step: self.state.step(),
            locked_round: self.state.locked_round(),
            locked_value: self.state.locked_value(),
            valid_round: self.state.valid_round(),
            valid_value: self.state.valid_value(),
            proposer: self.committee.proposer(round).address,
            is_proposer: self.is_proposer(),
            committee_size: self.committee.size(),
            quorum: self.committee.quorum(),
            rounds: self.messages.rounds().map(RoundSnapshot::of).collect(),
            future_round_power: self
                .future_round_power
                .iter()
                .map(|(r, powers)| (*r, powers.values().sum()))
                .collect(),
            propose_timer_started: self.propose_timeout.timer_started(),
            prevote_timer_started: self.prevote_timeout.timer_started(),
            precommit_timer_started: self.precommit_timeout.timer_started(),
            backlog_len: 0,
        }
    }
}
