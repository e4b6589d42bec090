//! Per-round, per-kind vote tally
//!
//! Votes are stored densely by committee index. The first vote of a
//! member is the one that counts toward power. The first conflicting vote
//! is kept as equivocation evidence; one is enough to prove it.

use super::error::StoreError;
use super::message::VoteKind;
use bft_types::{Address, Hash, Signature, VotingPower};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A vote as held by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedVote {
    /// Committee index of the sender.
    pub index: usize,
    pub sender: Address,
    pub value: Hash,
    pub power: VotingPower,
    pub signature: Signature,
}

/// Result of adding a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// First vote of this sender; power counted.
    Added,
    /// Same value already recorded for this sender.
    Duplicate,
    /// Sender already voted a different value.
    Equivocation,
}

/// A value backed by at least the requested power.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuorumCertificate {
    pub kind: VoteKind,
    pub value: Hash,
    pub power: VotingPower,
    pub votes: Vec<RecordedVote>,
}

#[derive(Clone, Debug)]
pub struct VoteSet {
    kind: VoteKind,
    votes: Vec<Option<RecordedVote>>,
    equivocations: Vec<RecordedVote>,
    power_by_value: HashMap<Hash, VotingPower>,
    total_power: VotingPower,
}

impl VoteSet {
    pub fn new(kind: VoteKind, committee_size: usize) -> Self {
        Self {
            kind,
            votes: vec![None; committee_size],
            equivocations: Vec::new(),
            power_by_value: HashMap::new(),
            total_power: 0,
        }
    }

    pub fn kind(&self) -> VoteKind {
        self.kind
    }

    pub fn add(&mut self, vote: RecordedVote) -> Result<AddOutcome, StoreError> {
        let size = self.votes.len();
        let slot = self
            .votes
            .get_mut(vote.index)
            .ok_or(StoreError::IndexOutOfRange {
                index: vote.index,
                size,
            })?;

        match slot {
            None => {
                *self.power_by_value.entry(vote.value).or_insert(0) += vote.power;
                self.total_power += vote.power;
                *slot = Some(vote);
                Ok(AddOutcome::Added)
            }
            Some(existing) if existing.value == vote.value => Ok(AddOutcome::Duplicate),
            Some(_) => {
                let known = self.equivocations.iter().any(|e| e.index == vote.index);
                if !known {
                    self.equivocations.push(vote);
                }
                Ok(AddOutcome::Equivocation)
            }
        }
    }

    /// Power of distinct senders whose counted vote is `value`.
    pub fn power(&self, value: &Hash) -> VotingPower {
        self.power_by_value.get(value).copied().unwrap_or(0)
    }

    /// Power of all distinct senders regardless of value.
    pub fn total_power(&self) -> VotingPower {
        self.total_power
    }

    /// Counted votes for `value`, in committee order.
    pub fn votes_for(&self, value: &Hash) -> Vec<&RecordedVote> {
        self.votes
            .iter()
            .flatten()
            .filter(|v| &v.value == value)
            .collect()
    }

    pub fn vote_of(&self, index: usize) -> Option<&RecordedVote> {
        self.votes.get(index).and_then(|v| v.as_ref())
    }

    /// Counted votes followed by equivocating ones.
    pub fn all(&self) -> impl Iterator<Item = &RecordedVote> {
        self.votes.iter().flatten().chain(self.equivocations.iter())
    }

    pub fn equivocations(&self) -> &[RecordedVote] {
        &self.equivocations
    }

    pub fn len(&self) -> usize {
        self.votes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.total_power == 0
    }

    /// Counted power per value, ordered by value.
    pub fn tally(&self) -> Vec<(Hash, VotingPower)> {
        let ordered: BTreeMap<Hash, VotingPower> =
            self.power_by_value.iter().map(|(k, v)| (*k, *v)).collect();
        ordered.into_iter().collect()
    }

    /// Find a value other than `excluded` backed by at least `quorum`.
    ///
    /// Every distinct-sender vote is considered, equivocations included, so
    /// a sender who signed two values contributes to both. This surfaces
    /// conflicting quorums that the counted tally alone would hide.
    pub fn search_quorum(&self, excluded: &Hash, quorum: VotingPower) -> Option<QuorumCertificate> {
        let mut by_value: BTreeMap<Hash, Vec<&RecordedVote>> = BTreeMap::new();
        for vote in self.all() {
            if &vote.value == excluded {
                continue;
            }
            let bucket = by_value.entry(vote.value).or_default();
            if !bucket.iter().any(|v| v.index == vote.index) {
                bucket.push(vote);
            }
        }

        by_value.into_iter().find_map(|(value, votes)| {
            let power: VotingPower = votes.iter().map(|v| v.power).sum();
            (power >= quorum).then(|| QuorumCertificate {
                kind: self.kind,
                value,
                power,
                votes: votes.into_iter().cloned().collect(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bft_types::NIL_VALUE;

    fn vote(index: usize, value: u8, power: VotingPower) -> RecordedVote {
        RecordedVote {
            index,
            sender: [index as u8; 20],
            value: [value; 32],
            power,
            signature: Signature::default(),
        }
    }

    #[test]
    fn test_power_counts_each_sender_once() {
        let mut set = VoteSet::new(VoteKind::Prevote, 4);
        assert_eq!(set.add(vote(0, 1, 1)).unwrap(), AddOutcome::Added);
        assert_eq!(set.add(vote(1, 1, 2)).unwrap(), AddOutcome::Added);
        assert_eq!(set.add(vote(2, 7, 3)).unwrap(), AddOutcome::Added);
        assert_eq!(set.power(&[1; 32]), 3);
        assert_eq!(set.power(&[7; 32]), 3);
        assert_eq!(set.total_power(), 6);
        assert_eq!(set.power(&NIL_VALUE), 0);
    }

    #[test]
    fn test_duplicate_is_idempotent() {
        let mut set = VoteSet::new(VoteKind::Prevote, 4);
        set.add(vote(0, 1, 1)).unwrap();
        assert_eq!(set.add(vote(0, 1, 1)).unwrap(), AddOutcome::Duplicate);
        assert_eq!(set.power(&[1; 32]), 1);
        assert_eq!(set.total_power(), 1);
        assert!(set.equivocations().is_empty());
    }

    #[test]
    fn test_equivocation_retained_without_power() {
        let mut set = VoteSet::new(VoteKind::Precommit, 4);
        set.add(vote(0, 1, 1)).unwrap();
        assert_eq!(set.add(vote(0, 2, 1)).unwrap(), AddOutcome::Equivocation);
        assert_eq!(set.add(vote(0, 2, 1)).unwrap(), AddOutcome::Equivocation);
        assert_eq!(set.add(vote(0, 3, 1)).unwrap(), AddOutcome::Equivocation);
        assert_eq!(set.power(&[1; 32]), 1);
        assert_eq!(set.power(&[2; 32]), 0);
        assert_eq!(set.total_power(), 1);
        assert_eq!(set.equivocations().len(), 1);
        assert_eq!(set.all().count(), 2);
        // first vote stays the counted one
        assert_eq!(set.vote_of(0).unwrap().value, [1; 32]);
    }

    #[test]
    fn test_index_out_of_range() {
        let mut set = VoteSet::new(VoteKind::Prevote, 2);
        assert_eq!(
            set.add(vote(5, 1, 1)).unwrap_err(),
            StoreError::IndexOutOfRange { index: 5, size: 2 }
        );
    }

    #[test]
    fn test_power_monotonic_under_arbitrary_insertions() {
        let mut set = VoteSet::new(VoteKind::Prevote, 6);
        let target = [1u8; 32];
        let mut last = 0;
        for (index, value) in [(0, 1), (1, 2), (0, 2), (2, 1), (1, 1), (3, 1), (2, 1)] {
            let _ = set.add(vote(index, value, 1));
            let now = set.power(&target);
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 3);
    }

    #[test]
    fn test_search_quorum_excludes_value() {
        let mut set = VoteSet::new(VoteKind::Prevote, 4);
        for i in 0..3 {
            set.add(vote(i, 1, 1)).unwrap();
        }
        assert!(set.search_quorum(&[1; 32], 3).is_none());
        let qc = set.search_quorum(&NIL_VALUE, 3).unwrap();
        assert_eq!(qc.value, [1; 32]);
        assert_eq!(qc.votes.len(), 3);
    }

    #[test]
    fn test_search_quorum_sees_equivocations() {
        let mut set = VoteSet::new(VoteKind::Precommit, 4);
        set.add(vote(0, 1, 1)).unwrap();
        set.add(vote(1, 1, 1)).unwrap();
        set.add(vote(2, 2, 1)).unwrap();
        set.add(vote(3, 2, 1)).unwrap();
        // sender 0 also signs value 2
        set.add(vote(0, 2, 1)).unwrap();
        let qc = set.search_quorum(&[1; 32], 3).unwrap();
        assert_eq!(qc.value, [2; 32]);
        assert_eq!(qc.power, 3);
        // counted tally unaffected
        assert_eq!(set.power(&[2; 32]), 2);
    }

    #[test]
    fn test_one_conflicting_vote_kept_per_sender() {
        let mut set = VoteSet::new(VoteKind::Prevote, 4);
        set.add(vote(0, 1, 1)).unwrap();
        for value in 2..=200u8 {
            assert_eq!(set.add(vote(0, value, 1)).unwrap(), AddOutcome::Equivocation);
        }
        set.add(vote(1, 1, 1)).unwrap();
        set.add(vote(1, 9, 1)).unwrap();

        let evidence: Vec<(usize, Hash)> =
            set.equivocations().iter().map(|e| (e.index, e.value)).collect();
        assert_eq!(evidence, vec![(0, [2; 32]), (1, [9; 32])]);
        assert_eq!(set.all().count(), 4);
    }
}
