//! Committee: the weighted validator set for one height
//!
//! A committee snapshot is immutable. When the validator set rotates a new
//! snapshot replaces the old one, so readers holding an `Arc` keep a
//! consistent view.

use super::error::CommitteeError;
use bft_types::{short_hex, Address, Round, VotingPower};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

/// A committee member and its voting weight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMember {
    pub address: Address,
    pub voting_power: VotingPower,
}

impl CommitteeMember {
    pub fn new(address: Address, voting_power: VotingPower) -> Self {
        Self {
            address,
            voting_power,
        }
    }
}

/// Read-only view of the committee the core consults.
pub trait Committee: Send + Sync + Debug {
    /// Members ordered by committee index.
    fn members(&self) -> &[CommitteeMember];

    fn total_power(&self) -> VotingPower;

    /// Minimum power treated as decisive (more than two thirds).
    fn quorum(&self) -> VotingPower;

    /// Maximum power assumed Byzantine (less than one third).
    fn f(&self) -> VotingPower;

    /// Member expected to propose at `round`.
    fn proposer(&self, round: Round) -> &CommitteeMember;

    fn size(&self) -> usize {
        self.members().len()
    }

    fn member_by_index(&self, index: usize) -> Option<&CommitteeMember> {
        self.members().get(index)
    }

    fn member_by_address(&self, address: &Address) -> Option<(usize, &CommitteeMember)> {
        self.members()
            .iter()
            .enumerate()
            .find(|(_, m)| &m.address == address)
    }

    fn is_proposer(&self, round: Round, address: &Address) -> bool {
        &self.proposer(round).address == address
    }
}

/// `ceil(2 * total / 3)`
pub fn quorum_for(total: VotingPower) -> VotingPower {
    (2 * total).div_ceil(3)
}

/// `ceil(total / 3) - 1`
pub fn f_for(total: VotingPower) -> VotingPower {
    total.div_ceil(3).saturating_sub(1)
}

/// Committee with round-robin proposer selection.
///
/// Members are sorted by address. The proposer of round `r` is member
/// `(offset + r) % size`, where `offset` is the index following the
/// proposer of the last committed block.
#[derive(Clone, Debug)]
pub struct RoundRobinCommittee {
    members: Vec<CommitteeMember>,
    total_power: VotingPower,
    offset: usize,
    lookup: HashMap<Address, usize>,
}

impl RoundRobinCommittee {
    /// Create a committee; `last_proposer` seeds the rotation offset.
    pub fn new(
        mut members: Vec<CommitteeMember>,
        last_proposer: Option<Address>,
    ) -> Result<Self, CommitteeError> {
        if members.is_empty() {
            return Err(CommitteeError::Empty);
        }
        members.sort_by(|a, b| a.address.cmp(&b.address));

        let mut lookup = HashMap::with_capacity(members.len());
        let mut total_power: VotingPower = 0;
        for (index, member) in members.iter().enumerate() {
            if member.voting_power == 0 {
                return Err(CommitteeError::ZeroPower(member.address));
            }
            if lookup.insert(member.address, index).is_some() {
                return Err(CommitteeError::DuplicateMember(member.address));
            }
            total_power += member.voting_power;
        }

        let offset = match last_proposer.and_then(|addr| lookup.get(&addr).copied()) {
            Some(index) if members.len() > 1 => index + 1,
            Some(index) => index,
            None => 0,
        };

        Ok(Self {
            members,
            total_power,
            offset,
            lookup,
        })
    }

    /// Committee of equally weighted members.
    pub fn with_equal_power(addresses: &[Address], power: VotingPower) -> Result<Self, CommitteeError> {
        let members = addresses
            .iter()
            .map(|a| CommitteeMember::new(*a, power))
            .collect();
        Self::new(members, None)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Committee for RoundRobinCommittee {
    fn members(&self) -> &[CommitteeMember] {
        &self.members
    }

    fn total_power(&self) -> VotingPower {
        self.total_power
    }

    fn quorum(&self) -> VotingPower {
        quorum_for(self.total_power)
    }

    fn f(&self) -> VotingPower {
        f_for(self.total_power)
    }

    fn proposer(&self, round: Round) -> &CommitteeMember {
        let round = round.max(0) as usize;
        &self.members[(self.offset + round) % self.members.len()]
    }

    fn member_by_address(&self, address: &Address) -> Option<(usize, &CommitteeMember)> {
        self.lookup
            .get(address)
            .map(|&index| (index, &self.members[index]))
    }
}

impl std::fmt::Display for RoundRobinCommittee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .members
            .iter()
            .map(|m| format!("{}:{}", short_hex(&m.address), m.voting_power))
            .collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(i: u8) -> Address {
        [i; 20]
    }

    fn equal(n: u8) -> RoundRobinCommittee {
        let addrs: Vec<Address> = (1..=n).map(addr).collect();
        RoundRobinCommittee::with_equal_power(&addrs, 1).unwrap()
    }

    #[test]
    fn test_thresholds_four_members() {
        let c = equal(4);
        assert_eq!(c.total_power(), 4);
        assert_eq!(c.quorum(), 3);
        assert_eq!(c.f(), 1);
    }

    #[test]
    fn test_thresholds_weighted() {
        assert_eq!(quorum_for(100), 67);
        assert_eq!(f_for(100), 33);
        assert_eq!(quorum_for(1), 1);
        assert_eq!(f_for(1), 0);
        assert_eq!(quorum_for(7), 5);
        assert_eq!(f_for(7), 2);
    }

    #[test]
    fn test_round_robin_rotation() {
        let c = equal(4);
        assert_eq!(c.proposer(0).address, addr(1));
        assert_eq!(c.proposer(1).address, addr(2));
        assert_eq!(c.proposer(4).address, addr(1));
    }

    #[test]
    fn test_offset_follows_last_proposer() {
        let members = (1..=4).map(|i| CommitteeMember::new(addr(i), 1)).collect();
        let c = RoundRobinCommittee::new(members, Some(addr(2))).unwrap();
        assert_eq!(c.proposer(0).address, addr(3));
        assert_eq!(c.proposer(2).address, addr(1));
    }

    #[test]
    fn test_single_member_keeps_proposing() {
        let members = vec![CommitteeMember::new(addr(1), 5)];
        let c = RoundRobinCommittee::new(members, Some(addr(1))).unwrap();
        assert_eq!(c.proposer(0).address, addr(1));
        assert_eq!(c.proposer(3).address, addr(1));
    }

    #[test]
    fn test_members_sorted_and_indexed() {
        let members = vec![
            CommitteeMember::new(addr(9), 1),
            CommitteeMember::new(addr(3), 2),
        ];
        let c = RoundRobinCommittee::new(members, None).unwrap();
        assert_eq!(c.member_by_index(0).unwrap().address, addr(3));
        assert_eq!(c.member_by_address(&addr(9)).unwrap().0, 1);
        assert!(c.member_by_address(&addr(4)).is_none());
    }

    #[test]
    fn test_invalid_committees() {
        assert_eq!(
            RoundRobinCommittee::new(vec![], None).unwrap_err(),
            CommitteeError::Empty
        );
        let dup = vec![
            CommitteeMember::new(addr(1), 1),
            CommitteeMember::new(addr(1), 1),
        ];
        assert!(matches!(
            RoundRobinCommittee::new(dup, None),
            Err(CommitteeError::DuplicateMember(_))
        ));
        let zero = vec![CommitteeMember::new(addr(1), 0)];
        assert!(matches!(
            RoundRobinCommittee::new(zero, None),
            Err(CommitteeError::ZeroPower(_))
        ));
    }
}
