//! The height/round/step record driven by the core

use bft_types::{Block, Hash, Height, Round, NO_ROUND};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase within a round. Only moves forward inside a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Step {
    Propose,
    Prevote,
    Precommit,
    /// Terminal for the height; reached only through commit.
    PrecommitDone,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Propose => "propose",
            Step::Prevote => "prevote",
            Step::Precommit => "precommit",
            Step::PrecommitDone => "precommit_done",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A block together with the round it was locked on or seen valid at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundValue {
    pub round: Round,
    pub block: Block,
}

impl RoundValue {
    pub fn hash(&self) -> Hash {
        self.block.hash()
    }
}

/// Height-scoped and round-scoped consensus fields.
///
/// Locked and valid values are `Option`s so a round without a value cannot
/// exist; the `-1` sentinel is produced by the accessors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TendermintState {
    height: Height,
    round: Round,
    step: Step,
    locked: Option<RoundValue>,
    valid: Option<RoundValue>,
    sent_proposal: bool,
    sent_prevote: bool,
    sent_precommit: bool,
    valid_round_and_value_set: bool,
}

impl TendermintState {
    pub fn new(height: Height) -> Self {
        Self {
            height,
            round: 0,
            step: Step::Propose,
            locked: None,
            valid: None,
            sent_proposal: false,
            sent_prevote: false,
            sent_precommit: false,
            valid_round_and_value_set: false,
        }
    }

    /// Reset every height-scoped field.
    pub fn start_new_height(&mut self, height: Height) {
        *self = Self::new(height);
    }

    /// Reset round-scoped flags and enter `round` at Propose.
    pub fn start_new_round(&mut self, round: Round) {
        self.round = round;
        self.step = Step::Propose;
        self.sent_proposal = false;
        self.sent_prevote = false;
        self.sent_precommit = false;
        self.valid_round_and_value_set = false;
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn set_step(&mut self, step: Step) {
        self.step = step;
    }

    pub fn locked(&self) -> Option<&RoundValue> {
        self.locked.as_ref()
    }

    pub fn valid(&self) -> Option<&RoundValue> {
        self.valid.as_ref()
    }

    pub fn locked_round(&self) -> Round {
        self.locked.as_ref().map_or(NO_ROUND, |l| l.round)
    }

    pub fn locked_value(&self) -> Option<Hash> {
        self.locked.as_ref().map(RoundValue::hash)
    }

    pub fn valid_round(&self) -> Round {
        self.valid.as_ref().map_or(NO_ROUND, |v| v.round)
    }

    pub fn valid_value(&self) -> Option<Hash> {
        self.valid.as_ref().map(RoundValue::hash)
    }

    /// Lock on `block` at `round`. Never moves the lock backwards.
    pub fn set_locked(&mut self, round: Round, block: Block) -> bool {
        if round < self.locked_round() {
            return false;
        }
        self.locked = Some(RoundValue { round, block });
        true
    }

    /// Record `block` as valid at `round`. Never moves backwards.
    pub fn set_valid(&mut self, round: Round, block: Block) -> bool {
        if round < self.valid_round() {
            return false;
        }
        self.valid = Some(RoundValue { round, block });
        true
    }

    pub fn sent_proposal(&self) -> bool {
        self.sent_proposal
    }

    pub fn set_sent_proposal(&mut self) {
        self.sent_proposal = true;
    }

    pub fn sent_prevote(&self) -> bool {
        self.sent_prevote
    }

    pub fn set_sent_prevote(&mut self) {
        self.sent_prevote = true;
    }

    pub fn sent_precommit(&self) -> bool {
        self.sent_precommit
    }

    pub fn set_sent_precommit(&mut self) {
        self.sent_precommit = true;
    }

    pub fn valid_round_and_value_set(&self) -> bool {
        self.valid_round_and_value_set
    }

    pub fn set_valid_round_and_value_set(&mut self) {
        self.valid_round_and_value_set = true;
    }
}
