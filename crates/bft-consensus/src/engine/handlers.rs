//! Message intake: view classification, storage and rule dispatch

use super::{Core, DeferReason, Disposition};
use crate::domain::{
    AddOutcome, BackendError, ConsensusMessage, CoreError, CoreResult, Payload, Proposal,
    ProposalSlot, RecordedVote, Step, StoreError, StoredProposal, Vote, VoteKind,
};
use crate::metrics;
use bft_types::{short_hex, VotingPower, NIL_VALUE};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Store form of a vote.
pub(super) fn recorded(
    message: &ConsensusMessage,
    vote: &Vote,
    index: usize,
    power: VotingPower,
) -> RecordedVote {
    RecordedVote {
        index,
        sender: message.sender(),
        value: vote.value,
        power,
        signature: *message.signature(),
    }
}

fn vote_disposition(outcome: AddOutcome) -> Option<Disposition> {
    match outcome {
        AddOutcome::Added => None,
        AddOutcome::Duplicate => Some(Disposition::Duplicate),
        AddOutcome::Equivocation => Some(Disposition::Equivocation),
    }
}

impl Core {
    pub(super) fn process_message(&mut self, message: ConsensusMessage) -> CoreResult<Disposition> {
        let height = self.state.height();
        match message.height().cmp(&height) {
            Ordering::Less => {
                debug!(?message, height, "Dropping message for a past height");
                return Ok(Disposition::Stale);
            }
            Ordering::Greater => {
                debug!(?message, height, "Deferring message for a future height");
                return Ok(Disposition::Defer(DeferReason::FutureHeight));
            }
            Ordering::Equal => {}
        }
        if self.state.step() == Step::PrecommitDone {
            debug!(?message, "Height already decided, dropping message");
            return Ok(Disposition::Stale);
        }

        let round = message.round();
        if round < 0 || round > self.config.max_round {
            return Err(StoreError::RoundOutOfRange {
                round,
                max_round: self.config.max_round,
            }
            .into());
        }

        let sender = message.sender();
        let Some((index, member)) = self.committee.member_by_address(&sender) else {
            panic!(
                "message from non-committee sender {} reached the core",
                short_hex(&sender)
            );
        };
        let power = member.voting_power;
        metrics::record_message_received(message.kind().as_str());

        if let Payload::Proposal(proposal) = message.payload() {
            if !proposal.block.payload_matches_root() {
                metrics::record_proposal_rejected("payload_mismatch");
                warn!(?message, "Proposal payload does not match its header");
                return Err(CoreError::PayloadMismatch { round });
            }
        }

        match round.cmp(&self.state.round()) {
            Ordering::Greater => {
                debug!(?message, current = self.state.round(), "Future round message");
                self.round_skip_check(round, index, power)?;
                Ok(Disposition::Defer(DeferReason::FutureRound))
            }
            Ordering::Less => self.handle_old_round(message, index, power),
            Ordering::Equal => self.handle_current_round(message, index, power),
        }
    }

    fn handle_current_round(
        &mut self,
        message: ConsensusMessage,
        index: usize,
        power: VotingPower,
    ) -> CoreResult<Disposition> {
        match message.payload().clone() {
            Payload::Proposal(proposal) => self.handle_current_proposal(message, proposal),
            Payload::Vote(vote) => {
                let rm = self.messages.get_or_create(vote.round)?;
                let outcome = rm.add_vote(vote.kind, recorded(&message, &vote, index, power))?;
                if let Some(disposition) = vote_disposition(outcome) {
                    if outcome == AddOutcome::Equivocation {
                        warn!(?message, "Equivocating vote");
                    }
                    return Ok(disposition);
                }
                self.log_accepted(&message);
                match vote.kind {
                    VoteKind::Prevote => self.current_prevote_checks()?,
                    VoteKind::Precommit => self.current_precommit_checks()?,
                }
                Ok(Disposition::Accepted)
            }
        }
    }

    fn handle_current_proposal(
        &mut self,
        message: ConsensusMessage,
        proposal: Proposal,
    ) -> CoreResult<Disposition> {
        let round = proposal.round;
        if !self.committee.is_proposer(round, &message.sender()) {
            metrics::record_proposal_rejected("not_from_proposer");
            return Err(CoreError::NotFromProposer {
                round,
                sender: message.sender(),
            });
        }
        if self.messages.get_or_create(round)?.proposal().is_some() {
            return Ok(Disposition::Duplicate);
        }

        match self.backend.verify_proposal(&proposal.block) {
            Ok(()) => {}
            Err(BackendError::FutureBlock(retry_after)) => {
                metrics::record_proposal_rejected("future_block");
                return Err(CoreError::FutureBlock { retry_after });
            }
            Err(e) => {
                metrics::record_proposal_rejected("invalid");
                warn!(?message, error = %e, "Invalid proposal");
                if self.state.step() == Step::Propose {
                    self.propose_timeout.reset();
                    self.send_prevote(NIL_VALUE)?;
                    self.set_step(Step::Prevote)?;
                }
                return Err(CoreError::InvalidProposal(e.to_string()));
            }
        }

        if self.state.step() == Step::Propose {
            self.propose_timeout.reset();
        }
        let slot = self
            .messages
            .get_or_create(round)?
            .set_proposal(StoredProposal {
                proposal: proposal.clone(),
                sender: message.sender(),
                signature: *message.signature(),
                verified: true,
            });
        if slot == ProposalSlot::Ignored {
            return Ok(Disposition::Duplicate);
        }
        self.log_accepted(&message);
        debug!(?message, valid_round = proposal.valid_round, "Accepted proposal");
        self.current_proposal_checks(&proposal)?;
        Ok(Disposition::Accepted)
    }

    /// Past-round messages feed the retrospective rules only; they never
    /// move the current round or step except through a commit.
    fn handle_old_round(
        &mut self,
        message: ConsensusMessage,
        index: usize,
        power: VotingPower,
    ) -> CoreResult<Disposition> {
        match message.payload().clone() {
            Payload::Proposal(proposal) => {
                let round = proposal.round;
                if !self.committee.is_proposer(round, &message.sender()) {
                    metrics::record_proposal_rejected("not_from_proposer");
                    return Err(CoreError::NotFromProposer {
                        round,
                        sender: message.sender(),
                    });
                }
                if self.messages.get_or_create(round)?.proposal().is_some() {
                    return Ok(Disposition::Duplicate);
                }
                if self.quorum_precommits_check(&proposal, false)? {
                    return Ok(Disposition::OldRound);
                }
                match self.backend.verify_proposal(&proposal.block) {
                    Ok(()) => {}
                    Err(BackendError::FutureBlock(retry_after)) => {
                        return Err(CoreError::FutureBlock { retry_after });
                    }
                    Err(e) => {
                        metrics::record_proposal_rejected("invalid");
                        return Err(CoreError::InvalidProposal(e.to_string()));
                    }
                }
                self.messages
                    .get_or_create(round)?
                    .set_proposal(StoredProposal {
                        proposal,
                        sender: message.sender(),
                        signature: *message.signature(),
                        verified: true,
                    });
                self.log_accepted(&message);
                Ok(Disposition::OldRound)
            }
            Payload::Vote(vote) => {
                let rm = self.messages.get_or_create(vote.round)?;
                let outcome = rm.add_vote(vote.kind, recorded(&message, &vote, index, power))?;
                if let Some(disposition) = vote_disposition(outcome) {
                    return Ok(disposition);
                }
                self.log_accepted(&message);
                match vote.kind {
                    VoteKind::Prevote => {
                        if let Some(current) = self.current_proposal() {
                            if current.valid_round == vote.round {
                                self.old_proposal_check(&current)?;
                            }
                        }
                    }
                    VoteKind::Precommit => {
                        let stored = self
                            .messages
                            .get(vote.round)?
                            .and_then(|rm| rm.proposal())
                            .map(|s| (s.proposal.clone(), s.verified));
                        if let Some((proposal, verified)) = stored {
                            self.quorum_precommits_check(&proposal, verified)?;
                        }
                    }
                }
                Ok(Disposition::OldRound)
            }
        }
    }
}
