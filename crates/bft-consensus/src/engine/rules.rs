//! Upon-rules
//!
//! Each check reads the store and state, and acts only when its condition
//! holds. All of them are safe to re-run on every new piece of evidence;
//! the step and the sent flags keep them from acting twice in a round.

use super::Core;
use crate::domain::{BackendError, CoreError, CoreResult, Proposal, Step};
use crate::metrics;
use bft_telemetry::log_event;
use bft_types::{short_hex, Round, NIL_VALUE, NO_ROUND};
use tracing::{debug, error, info};

impl Core {
    /// Fresh proposal while in Propose: prevote it unless locked elsewhere.
    pub(super) fn new_proposal_check(&mut self, proposal: &Proposal) -> CoreResult<()> {
        if self.state.step() != Step::Propose || proposal.valid_round != NO_ROUND {
            return Ok(());
        }
        let value = proposal.value();
        let accept =
            self.state.locked_round() == NO_ROUND || self.state.locked_value() == Some(value);
        self.send_prevote(if accept { value } else { NIL_VALUE })?;
        self.set_step(Step::Prevote)
    }

    /// Re-proposal of a value that gathered a prevote quorum at `valid_round`.
    pub(super) fn old_proposal_check(&mut self, proposal: &Proposal) -> CoreResult<()> {
        let vr = proposal.valid_round;
        if self.state.step() != Step::Propose || vr == NO_ROUND || vr >= self.state.round() {
            return Ok(());
        }
        let value = proposal.value();
        let quorum = self.committee.quorum();
        if self.messages.get_or_create(vr)?.prevotes_power(&value) < quorum {
            return Ok(());
        }
        let accept = self.state.locked_round() <= vr || self.state.locked_value() == Some(value);
        self.send_prevote(if accept { value } else { NIL_VALUE })?;
        self.set_step(Step::Prevote)
    }

    pub(super) fn prevote_timeout_check(&mut self) -> CoreResult<()> {
        if self.state.step() != Step::Prevote
            || self.prevote_timeout.timer_started()
            || self.state.sent_precommit()
        {
            return Ok(());
        }
        let round = self.state.round();
        if self.messages.get_or_create(round)?.prevotes_total_power() >= self.committee.quorum() {
            let after = self.config.prevote_timeout(round);
            self.prevote_timeout
                .schedule(self.scheduler.as_ref(), after, self.state.height(), round);
            debug!(height = self.state.height(), round, ?after, "Scheduled prevote timeout");
        }
        Ok(())
    }

    /// Prevote quorum for the current proposal: lock and precommit while in
    /// Prevote, and record the valid value once per round in any later step.
    pub(super) fn quorum_prevotes_check(&mut self, proposal: &Proposal) -> CoreResult<()> {
        if self.state.step() == Step::Propose || self.state.valid_round_and_value_set() {
            return Ok(());
        }
        let round = self.state.round();
        let value = proposal.value();
        if self.messages.get_or_create(round)?.prevotes_power(&value) < self.committee.quorum() {
            return Ok(());
        }
        if self.state.step() == Step::Prevote {
            self.state.set_locked(round, proposal.block.clone());
            info!(height = self.state.height(), round, value = %short_hex(&value), "Locked on value");
            self.send_precommit(value)?;
            self.set_step(Step::Precommit)?;
        }
        self.state.set_valid(round, proposal.block.clone());
        self.state.set_valid_round_and_value_set();
        Ok(())
    }

    pub(super) fn quorum_prevotes_nil_check(&mut self) -> CoreResult<()> {
        if self.state.step() != Step::Prevote {
            return Ok(());
        }
        let round = self.state.round();
        if self.messages.get_or_create(round)?.prevotes_power(&NIL_VALUE) >= self.committee.quorum() {
            debug!(height = self.state.height(), round, "Prevote quorum for nil");
            self.send_precommit(NIL_VALUE)?;
            self.set_step(Step::Precommit)?;
        }
        Ok(())
    }

    pub(super) fn precommit_timeout_check(&mut self) -> CoreResult<()> {
        if self.precommit_timeout.timer_started() {
            return Ok(());
        }
        let round = self.state.round();
        if self.messages.get_or_create(round)?.precommits_total_power() >= self.committee.quorum() {
            let after = self.config.precommit_timeout(round);
            self.precommit_timeout
                .schedule(self.scheduler.as_ref(), after, self.state.height(), round);
            debug!(height = self.state.height(), round, ?after, "Scheduled precommit timeout");
        }
        Ok(())
    }

    /// Precommit quorum for `proposal` at its own round: decide.
    ///
    /// An unverified proposal is verified first. A block already in the
    /// local chain ends the height without a commit.
    ///
    /// # Panics
    /// If a quorum precommitted a block the backend rejects. That means
    /// more than `f` faulty members or a broken backend; continuing would
    /// risk a fork.
    pub(super) fn quorum_precommits_check(
        &mut self,
        proposal: &Proposal,
        verified: bool,
    ) -> CoreResult<bool> {
        let value = proposal.value();
        let quorum = self.committee.quorum();
        if self.messages.get_or_create(proposal.round)?.precommits_power(&value) < quorum {
            return Ok(false);
        }
        if !verified {
            match self.backend.verify_proposal(&proposal.block) {
                Ok(()) => {}
                Err(BackendError::KnownBlock) => {
                    info!(
                        height = self.state.height(),
                        value = %short_hex(&value),
                        "Decided block is already in the local chain"
                    );
                    self.state.set_step(Step::PrecommitDone);
                    self.reset_timers();
                    return Ok(true);
                }
                Err(BackendError::FutureBlock(retry_after)) => {
                    return Err(CoreError::FutureBlock { retry_after });
                }
                Err(e) => {
                    error!(
                        height = self.state.height(),
                        round = proposal.round,
                        value = %short_hex(&value),
                        error = %e,
                        "Quorum precommitted an invalid block"
                    );
                    panic!("Fatal Safety Error: quorum on unverifiable proposal: {e}");
                }
            }
            self.messages
                .get_or_create(proposal.round)?
                .mark_proposal_verified();
        }
        self.commit(proposal)?;
        Ok(true)
    }

    /// More than `f` power already talks about `round`: jump there.
    pub(super) fn round_skip_check(
        &mut self,
        round: Round,
        index: usize,
        power: bft_types::VotingPower,
    ) -> CoreResult<bool> {
        let senders = self.future_round_power.entry(round).or_default();
        senders.insert(index, power);
        let total: bft_types::VotingPower = senders.values().sum();
        if total <= self.committee.f() {
            return Ok(false);
        }
        log_event!(
            info,
            "round_skip",
            height = self.state.height(),
            from = self.state.round(),
            to = round,
            power = %total
        );
        metrics::record_round_skip();
        self.start_round(round)?;
        Ok(true)
    }

    /// Everything a newly stored current-round proposal can trigger.
    pub(super) fn current_proposal_checks(&mut self, proposal: &Proposal) -> CoreResult<()> {
        if self.quorum_precommits_check(proposal, true)? {
            return Ok(());
        }
        self.new_proposal_check(proposal)?;
        self.old_proposal_check(proposal)?;
        self.quorum_prevotes_check(proposal)
    }

    pub(super) fn current_prevote_checks(&mut self) -> CoreResult<()> {
        if let Some(proposal) = self.current_proposal() {
            self.quorum_prevotes_check(&proposal)?;
        }
        self.quorum_prevotes_nil_check()?;
        self.prevote_timeout_check()
    }

    pub(super) fn current_precommit_checks(&mut self) -> CoreResult<()> {
        let round = self.state.round();
        let stored = self
            .messages
            .get(round)?
            .and_then(|rm| rm.proposal())
            .map(|stored| (stored.proposal.clone(), stored.verified));
        if let Some((proposal, verified)) = stored {
            if self.quorum_precommits_check(&proposal, verified)? {
                return Ok(());
            }
        }
        self.precommit_timeout_check()
    }

    pub(super) fn current_proposal(&self) -> Option<Proposal> {
        self.messages
            .get(self.state.round())
            .ok()
            .flatten()
            .and_then(|rm| rm.proposal())
            .map(|stored| stored.proposal.clone())
    }
}
