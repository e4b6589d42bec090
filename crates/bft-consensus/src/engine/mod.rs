//! Tendermint state machine
//!
//! [`Core`] owns the consensus state of one validator and advances it one
//! event at a time: a verified message, a fired timeout token, a new
//! candidate block or a finalized-block notification. It never blocks and
//! never spawns; everything asynchronous lives behind the outbound ports.
//!
//! ## Processing model
//!
//! Every entry point runs the relevant upon-rules to a fixed point, then
//! drains the messages this validator produced while doing so through the
//! same handlers (self-delivery), then mirrors the state into the WAL.

mod handlers;
mod rules;
mod snapshot;
mod timeout;


pub use snapshot::*;
pub use timeout::*;

use crate::config::ConsensusConfig;
use crate::domain::{
    AggregateSeal, Behaviour, Committee, ConsensusMessage, CoreError, CoreResult, MessageMap,
    Payload, Proposal, Step, StoredProposal, TendermintState, Vote,
};
use crate::metrics;
use crate::ports::{Backend, Broadcaster, CommitteeProvider, ConsensusWal, TimeoutScheduler};
use bft_telemetry::{consensus_span, log_event};
use bft_types::{short_hex, Address, Block, Hash, Height, Round, VotingPower};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a message could not be processed yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferReason {
    FutureHeight,
    FutureRound,
}

/// What the core did with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Stored for the current round and rules re-evaluated.
    Accepted,
    /// Already held; nothing changed.
    Duplicate,
    /// Conflicting vote from a sender that already voted this round.
    Equivocation,
    /// Stored for a past round of the current height.
    OldRound,
    /// Past height, or the height is already decided.
    Stale,
    /// Buffer and redeliver once the view catches up.
    Defer(DeferReason),
}

/// Ports the core drives.
#[derive(Clone)]
pub struct CoreDependencies {
    pub backend: Arc<dyn Backend>,
    pub committee_provider: Arc<dyn CommitteeProvider>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub scheduler: Arc<dyn TimeoutScheduler>,
    pub behaviour: Arc<dyn Behaviour>,
    pub wal: Option<Arc<dyn ConsensusWal>>,
}

pub struct Core {
    config: ConsensusConfig,
    address: Address,
    backend: Arc<dyn Backend>,
    committee_provider: Arc<dyn CommitteeProvider>,
    broadcaster: Arc<dyn Broadcaster>,
    scheduler: Arc<dyn TimeoutScheduler>,
    behaviour: Arc<dyn Behaviour>,
    wal: Option<Arc<dyn ConsensusWal>>,

    state: TendermintState,
    messages: MessageMap,
    committee: Arc<dyn Committee>,
    head: Block,

    propose_timeout: Timeout,
    prevote_timeout: Timeout,
    precommit_timeout: Timeout,

    /// Power seen per future round, keyed by committee index.
    future_round_power: BTreeMap<Round, HashMap<usize, VotingPower>>,
    candidates: BTreeMap<Height, Block>,
    waiting_for_candidate: bool,
    own_messages: VecDeque<ConsensusMessage>,
    wal_sequence: u64,
    last_saved_state: Option<TendermintState>,
}

impl Core {
    /// Build a core positioned after the backend's current head.
    ///
    /// Nothing is sent until [`Core::start`].
    pub fn new(config: ConsensusConfig, deps: CoreDependencies) -> CoreResult<Self> {
        let head = deps.backend.head_block();
        let committee = deps.committee_provider.committee_for(&head)?;
        let height = head.height() + 1;
        Ok(Self {
            address: deps.backend.address(),
            messages: MessageMap::new(committee.size(), config.max_round),
            state: TendermintState::new(height),
            config,
            backend: deps.backend,
            committee_provider: deps.committee_provider,
            broadcaster: deps.broadcaster,
            scheduler: deps.scheduler,
            behaviour: deps.behaviour,
            wal: deps.wal,
            committee,
            head,
            propose_timeout: Timeout::new(TimeoutPhase::Propose),
            prevote_timeout: Timeout::new(TimeoutPhase::Prevote),
            precommit_timeout: Timeout::new(TimeoutPhase::Precommit),
            future_round_power: BTreeMap::new(),
            candidates: BTreeMap::new(),
            waiting_for_candidate: false,
            own_messages: VecDeque::new(),
            wal_sequence: 0,
            last_saved_state: None,
        })
    }

    /// Enter round 0 of the next height, or resume from the WAL if it holds
    /// progress for that height.
    pub fn start(&mut self) -> CoreResult<()> {
        let height = self.backend.head_block().height() + 1;
        let record = match &self.wal {
            Some(wal) => wal.load(height)?,
            None => None,
        };
        let result = match record {
            Some(record) if record.state.is_some() || !record.messages.is_empty() => {
                self.prepare_height()?;
                self.restore(record)
            }
            _ => self.start_round(0),
        };
        self.finish_event();
        result
    }

    /// Process one verified message.
    ///
    /// # Panics
    /// If the sender is not a member of the current committee. Ingress
    /// filters those out; reaching the core with one is a wiring bug.
    pub fn handle_message(&mut self, message: ConsensusMessage) -> CoreResult<Disposition> {
        let result = self.process_message(message);
        self.finish_event();
        result
    }

    /// Act on a fired timer. Tokens from an earlier view are ignored.
    pub fn handle_timeout(&mut self, token: TimeoutToken) -> CoreResult<()> {
        let result = self.on_timeout(token);
        self.finish_event();
        result
    }

    /// Offer a block to propose at its height.
    pub fn new_candidate_block(&mut self, block: Block) -> CoreResult<()> {
        let result = self.on_candidate(block);
        self.finish_event();
        result
    }

    /// The backend finished writing a decided block; move to the next height.
    pub fn on_block_finalized(&mut self, block: &Block) -> CoreResult<()> {
        let result = self.on_finalized(block);
        self.finish_event();
        result
    }

    pub fn height(&self) -> Height {
        self.state.height()
    }

    pub fn round(&self) -> Round {
        self.state.round()
    }

    pub fn step(&self) -> Step {
        self.state.step()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn state(&self) -> &TendermintState {
        &self.state
    }

    pub fn messages(&self) -> &MessageMap {
        &self.messages
    }

    pub fn committee(&self) -> Arc<dyn Committee> {
        Arc::clone(&self.committee)
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn is_proposer(&self) -> bool {
        self.committee.is_proposer(self.state.round(), &self.address)
    }

    // ---- state machine ----

    /// Reload head and committee and clear every height-scoped structure.
    fn prepare_height(&mut self) -> CoreResult<()> {
        let head = self.backend.head_block();
        let committee = self.committee_provider.committee_for(&head)?;
        let height = head.height() + 1;

        self.state.start_new_height(height);
        self.messages.reset(committee.size());
        self.committee = committee;
        self.head = head;
        self.future_round_power.clear();
        self.candidates.retain(|h, _| *h >= height);
        self.wal_sequence = 0;
        self.last_saved_state = None;
        if let Some(wal) = &self.wal {
            wal.truncate_below(height)?;
        }

        metrics::record_height_changed(height);
        info!(
            height,
            committee_size = self.committee.size(),
            total_power = %self.committee.total_power(),
            "Starting new height"
        );
        Ok(())
    }

    pub(crate) fn start_round(&mut self, round: Round) -> CoreResult<()> {
        if round == 0 {
            self.prepare_height()?;
        }
        self.reset_timers();
        self.future_round_power.retain(|r, _| *r > round);
        self.waiting_for_candidate = false;
        self.state.start_new_round(round);
        self.messages.get_or_create(round)?;

        let height = self.state.height();
        let _span = consensus_span!("round", height, round).entered();
        let proposer = self.committee.proposer(round).address;
        metrics::record_round_started(round);
        info!(
            height,
            round,
            proposer = %short_hex(&proposer),
            is_proposer = proposer == self.address,
            "Starting new round"
        );

        if proposer == self.address {
            if let Some(valid) = self.state.valid().cloned() {
                self.send_proposal(valid.block)?;
            } else if let Some(candidate) = self.candidates.get(&height).cloned() {
                self.send_proposal(candidate)?;
            } else {
                debug!(height, round, "Waiting for a candidate block to propose");
                self.waiting_for_candidate = true;
            }
        } else {
            let after = self.config.propose_timeout(round);
            self.propose_timeout
                .schedule(self.scheduler.as_ref(), after, height, round);
            debug!(height, round, ?after, "Scheduled propose timeout");
        }
        Ok(())
    }

    /// Seal the precommits for `proposal` and hand the block over.
    ///
    /// The next height starts only once the block is reported finalized.
    fn commit(&mut self, proposal: &Proposal) -> CoreResult<()> {
        self.state.set_step(Step::PrecommitDone);
        self.reset_timers();

        let height = self.state.height();
        let value = proposal.value();
        let seal = {
            let rm = self.messages.get_or_create(proposal.round)?;
            let precommits = rm.precommits_for(&value);
            AggregateSeal::from_precommits(
                height,
                proposal.round,
                value,
                self.committee.size(),
                &precommits,
            )
        };

        metrics::record_commit(proposal.round);
        log_event!(
            info,
            "commit",
            height,
            round = self.state.round(),
            proposal_round = proposal.round,
            value = %short_hex(&value),
            signers = seal.signer_count()
        );
        self.backend.commit(&proposal.block, proposal.round, seal)?;
        Ok(())
    }

    fn reset_timers(&mut self) {
        self.propose_timeout.reset();
        self.prevote_timeout.reset();
        self.precommit_timeout.reset();
    }

    pub(crate) fn set_step(&mut self, step: Step) -> CoreResult<()> {
        debug!(
            height = self.state.height(),
            round = self.state.round(),
            from = %self.state.step(),
            to = %step,
            "Step change"
        );
        self.state.set_step(step);
        if step == Step::Prevote {
            self.current_prevote_checks()?;
        }
        Ok(())
    }

    // ---- outgoing messages ----

    fn send_proposal(&mut self, block: Block) -> CoreResult<()> {
        if self.state.sent_proposal() || block.height() != self.state.height() {
            return Ok(());
        }
        let chosen = self.behaviour.proposal(&self.state, &block);
        self.state.set_sent_proposal();
        if let Some(block) = chosen {
            let proposal = Proposal {
                height: self.state.height(),
                round: self.state.round(),
                valid_round: self.state.valid_round(),
                block,
            };
            debug!(
                height = proposal.height,
                round = proposal.round,
                valid_round = proposal.valid_round,
                value = %short_hex(&proposal.value()),
                "Sending proposal"
            );
            self.send(Payload::Proposal(proposal))?;
        }
        Ok(())
    }

    pub(crate) fn send_prevote(&mut self, value: Hash) -> CoreResult<()> {
        if self.state.sent_prevote() {
            return Ok(());
        }
        let chosen = self.behaviour.prevote(&self.state, value);
        self.state.set_sent_prevote();
        if let Some(value) = chosen {
            let vote = Vote::prevote(self.state.height(), self.state.round(), value);
            debug!(height = vote.height, round = vote.round, nil = vote.is_nil(), "Sending prevote");
            self.send(Payload::Vote(vote))?;
        }
        Ok(())
    }

    pub(crate) fn send_precommit(&mut self, value: Hash) -> CoreResult<()> {
        if self.state.sent_precommit() {
            return Ok(());
        }
        let chosen = self.behaviour.precommit(&self.state, value);
        self.state.set_sent_precommit();
        if let Some(value) = chosen {
            let vote = Vote::precommit(self.state.height(), self.state.round(), value);
            debug!(height = vote.height, round = vote.round, nil = vote.is_nil(), "Sending precommit");
            self.send(Payload::Vote(vote))?;
        }
        Ok(())
    }

    /// Sign, gossip and queue for self-delivery.
    fn send(&mut self, payload: Payload) -> CoreResult<()> {
        if self.committee.member_by_address(&self.address).is_none() {
            debug!(kind = payload.kind().as_str(), "Not a committee member, not sending");
            return Ok(());
        }
        let digest = payload.digest()?;
        let signature = self.backend.sign(&digest)?;
        let message = ConsensusMessage::new(payload, signature, self.address);
        self.broadcaster.broadcast(&message);
        self.own_messages.push_back(message);
        Ok(())
    }

    // ---- events other than messages ----

    fn on_timeout(&mut self, token: TimeoutToken) -> CoreResult<()> {
        if token.height != self.state.height() || token.round != self.state.round() {
            debug!(%token, height = self.state.height(), round = self.state.round(), "Ignoring stale timeout");
            return Ok(());
        }
        metrics::record_timeout(token.phase.as_str());
        match token.phase {
            TimeoutPhase::Propose => {
                if self.state.step() == Step::Propose {
                    info!(height = token.height, round = token.round, "Propose timeout, prevoting nil");
                    self.send_prevote(bft_types::NIL_VALUE)?;
                    self.set_step(Step::Prevote)?;
                }
            }
            TimeoutPhase::Prevote => {
                if self.state.step() == Step::Prevote {
                    info!(height = token.height, round = token.round, "Prevote timeout, precommitting nil");
                    self.send_precommit(bft_types::NIL_VALUE)?;
                    self.set_step(Step::Precommit)?;
                }
            }
            TimeoutPhase::Precommit => {
                if self.state.step() != Step::PrecommitDone {
                    let next = token.round + 1;
                    if next > self.config.max_round {
                        warn!(height = token.height, round = token.round, "Round limit reached, staying in round");
                    } else {
                        info!(height = token.height, round = token.round, "Precommit timeout, moving to next round");
                        self.start_round(next)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn on_candidate(&mut self, block: Block) -> CoreResult<()> {
        let height = self.state.height();
        if block.height() < height {
            debug!(candidate = block.height(), height, "Dropping candidate for a past height");
            return Ok(());
        }
        let candidate_height = block.height();
        self.candidates.insert(candidate_height, block);
        if candidate_height == height
            && self.waiting_for_candidate
            && self.state.step() == Step::Propose
            && self.is_proposer()
        {
            self.waiting_for_candidate = false;
            if let Some(block) = self.candidates.get(&height).cloned() {
                self.send_proposal(block)?;
            }
        }
        Ok(())
    }

    fn on_finalized(&mut self, block: &Block) -> CoreResult<()> {
        if block.height() < self.state.height() {
            debug!(finalized = block.height(), height = self.state.height(), "Ignoring finalization of an old block");
            return Ok(());
        }
        let head = self.backend.head_block();
        if head.height() < self.state.height() {
            warn!(
                head = head.height(),
                height = self.state.height(),
                "Finalization reported before the backend head moved"
            );
            return Ok(());
        }
        self.start_round(0)
    }

    // ---- bookkeeping ----

    /// Self-delivery followed by the WAL state mirror.
    fn finish_event(&mut self) {
        while let Some(message) = self.own_messages.pop_front() {
            match self.process_message(message) {
                Ok(_) => {}
                Err(CoreError::FutureBlock { .. }) => {
                    debug!("Own proposal has a future timestamp")
                }
                Err(e) => warn!(error = %e, "Failed to process own message"),
            }
        }
        self.persist_state();
    }

    fn persist_state(&mut self) {
        let Some(wal) = &self.wal else {
            return;
        };
        if self.last_saved_state.as_ref() == Some(&self.state) {
            return;
        }
        match wal.save_state(&self.state) {
            Ok(()) => self.last_saved_state = Some(self.state.clone()),
            Err(e) => warn!(error = %e, "Failed to save consensus state"),
        }
    }

    fn log_accepted(&mut self, message: &ConsensusMessage) {
        let Some(wal) = &self.wal else {
            return;
        };
        self.wal_sequence += 1;
        if let Err(e) = wal.append_message(self.state.height(), self.wal_sequence, message) {
            warn!(error = %e, "Failed to append message to WAL");
        }
    }

    /// Rebuild the store from the WAL and resume the logged round.
    fn restore(&mut self, record: crate::ports::WalRecord) -> CoreResult<()> {
        let height = self.state.height();
        let mut restored = 0usize;
        for (sequence, message) in &record.messages {
            self.wal_sequence = self.wal_sequence.max(*sequence);
            if message.height() != height {
                continue;
            }
            if self.store_restored(message)? {
                restored += 1;
            }
        }

        let round = match record.state {
            Some(state) if state.height() == height => {
                let round = state.round();
                self.state = state;
                round
            }
            _ => 0,
        };
        self.messages.get_or_create(round)?;
        self.last_saved_state = Some(self.state.clone());
        info!(height, round, step = %self.state.step(), restored, "Restored consensus state from WAL");
        self.resume_round()
    }

    fn store_restored(&mut self, message: &ConsensusMessage) -> CoreResult<bool> {
        let Some((index, member)) = self.committee.member_by_address(&message.sender()) else {
            return Ok(false);
        };
        let power = member.voting_power;
        let rm = self.messages.get_or_create(message.round())?;
        match message.payload() {
            Payload::Proposal(proposal) => {
                rm.set_proposal(StoredProposal {
                    proposal: proposal.clone(),
                    sender: message.sender(),
                    signature: *message.signature(),
                    verified: true,
                });
            }
            Payload::Vote(vote) => {
                rm.add_vote(vote.kind, handlers::recorded(message, vote, index, power))?;
            }
        }
        Ok(true)
    }

    /// Re-arm timers and rerun the rules for the restored round.
    fn resume_round(&mut self) -> CoreResult<()> {
        let height = self.state.height();
        let round = self.state.round();
        match self.state.step() {
            Step::PrecommitDone => return Ok(()),
            Step::Propose if self.is_proposer() => {
                if let Some(valid) = self.state.valid().cloned() {
                    self.send_proposal(valid.block)?;
                } else if let Some(candidate) = self.candidates.get(&height).cloned() {
                    self.send_proposal(candidate)?;
                } else {
                    self.waiting_for_candidate = true;
                }
            }
            Step::Propose => {
                let after = self.config.propose_timeout(round);
                self.propose_timeout
                    .schedule(self.scheduler.as_ref(), after, height, round);
            }
            Step::Prevote | Step::Precommit => {}
        }
        let proposal = self
            .messages
            .get(round)?
            .and_then(|rm| rm.proposal())
            .map(|stored| stored.proposal.clone());
        if let Some(proposal) = proposal {
            self.current_proposal_checks(&proposal)?;
        }
        if self.state.step() == Step::Prevote {
            self.current_prevote_checks()?;
        }
        if self.state.step() != Step::PrecommitDone {
            self.current_precommit_checks()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("address", &short_hex(&self.address))
            .field("height", &self.state.height())
            .field("round", &self.state.round())
            .field("step", &self.state.step())
            .finish()
    }
}
