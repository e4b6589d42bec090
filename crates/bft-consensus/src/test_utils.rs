//! Test utilities for the consensus engine.
//!
//! In-memory implementations of the outbound ports and faulty
//! [`Behaviour`]s for deterministic tests. Enable with the `test-utils`
//! feature flag.

use crate::adapters::LocalSigner;
use crate::domain::{
    AggregateSeal, BackendError, Behaviour, Committee, CommitteeError, CommitteeMember,
    ConsensusMessage, Payload, RoundRobinCommittee, TendermintState, Vote,
};
use crate::ports::{Backend, Broadcaster, CommitteeProvider};
use bft_types::{Address, Block, Hash, Round, Signature, VotingPower, NIL_VALUE};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A block handed to [`Backend::commit`].
#[derive(Clone, Debug)]
pub struct CommitRecord {
    pub block: Block,
    pub round: Round,
    pub seal: AggregateSeal,
}

/// Backend over an in-memory chain.
///
/// Committing appends the block, so the head moves immediately. Verification
/// checks parent linkage and payload root; individual verdicts can be forced
/// per block hash.
pub struct InMemoryBackend {
    signer: LocalSigner,
    chain: Mutex<Vec<Block>>,
    verdicts: Mutex<HashMap<Hash, BackendError>>,
    commits: Mutex<Vec<CommitRecord>>,
    listener: Mutex<Option<mpsc::UnboundedSender<Block>>>,
}

impl InMemoryBackend {
    pub fn new(signer: LocalSigner) -> Self {
        Self::with_chain(signer, vec![Block::genesis()])
    }

    pub fn with_chain(signer: LocalSigner, chain: Vec<Block>) -> Self {
        Self {
            signer,
            chain: Mutex::new(chain),
            verdicts: Mutex::new(HashMap::new()),
            commits: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
        }
    }

    /// Notify `tx` with every committed block.
    pub fn set_commit_listener(&self, tx: mpsc::UnboundedSender<Block>) {
        *self.listener.lock() = Some(tx);
    }

    /// Force the result of verifying the block with `hash`.
    pub fn force_verdict(&self, hash: Hash, verdict: BackendError) {
        self.verdicts.lock().insert(hash, verdict);
    }

    pub fn clear_verdict(&self, hash: &Hash) {
        self.verdicts.lock().remove(hash);
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        self.commits.lock().clone()
    }

    pub fn chain(&self) -> Vec<Block> {
        self.chain.lock().clone()
    }

    /// A valid child of the current head.
    pub fn next_block(&self, payload: Vec<Vec<u8>>) -> Block {
        let head = self.head_block();
        Block::new(
            head.height() + 1,
            head.hash(),
            self.signer.address(),
            head.header.timestamp + 1,
            payload,
        )
    }

    pub fn signer(&self) -> &LocalSigner {
        &self.signer
    }
}

impl Backend for InMemoryBackend {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn head_block(&self) -> Block {
        self.chain
            .lock()
            .last()
            .cloned()
            .unwrap_or_else(Block::genesis)
    }

    fn verify_proposal(&self, block: &Block) -> Result<(), BackendError> {
        let hash = block.hash();
        if let Some(verdict) = self.verdicts.lock().get(&hash) {
            return Err(verdict.clone());
        }
        let chain = self.chain.lock();
        if chain.iter().any(|b| b.hash() == hash) {
            return Err(BackendError::KnownBlock);
        }
        let head = chain.last().cloned().unwrap_or_else(Block::genesis);
        if block.header.parent_hash != head.hash() || block.height() != head.height() + 1 {
            return Err(BackendError::InvalidBlock("not a child of the head".into()));
        }
        if !block.payload_matches_root() {
            return Err(BackendError::InvalidBlock("payload root mismatch".into()));
        }
        Ok(())
    }

    fn commit(&self, block: &Block, round: Round, seal: AggregateSeal) -> Result<(), BackendError> {
        {
            let mut chain = self.chain.lock();
            let head_height = chain.last().map_or(0, |b| b.height());
            if block.height() != head_height + 1 {
                return Err(BackendError::CommitFailed(format!(
                    "block {} does not extend head {}",
                    block.height(),
                    head_height
                )));
            }
            chain.push(block.clone());
        }
        self.commits.lock().push(CommitRecord {
            block: block.clone(),
            round,
            seal,
        });
        if let Some(tx) = self.listener.lock().as_ref() {
            let _ = tx.send(block.clone());
        }
        Ok(())
    }

    fn sign(&self, digest: &Hash) -> Result<Signature, BackendError> {
        self.signer.sign(digest)
    }
}

/// The same weighted members at every height.
#[derive(Clone, Debug)]
pub struct StaticCommitteeProvider {
    members: Vec<CommitteeMember>,
}

impl StaticCommitteeProvider {
    pub fn new(members: Vec<CommitteeMember>) -> Self {
        Self { members }
    }

    pub fn equal(addresses: &[Address], power: VotingPower) -> Self {
        Self::new(
            addresses
                .iter()
                .map(|a| CommitteeMember::new(*a, power))
                .collect(),
        )
    }
}

impl CommitteeProvider for StaticCommitteeProvider {
    fn committee_for(&self, parent: &Block) -> Result<Arc<dyn Committee>, CommitteeError> {
        let last_proposer = (!parent.header.is_genesis()).then_some(parent.header.proposer);
        Ok(Arc::new(RoundRobinCommittee::new(
            self.members.clone(),
            last_proposer,
        )?))
    }
}

/// Remembers every broadcast message.
#[derive(Clone, Debug, Default)]
pub struct RecordingBroadcaster {
    sent: Arc<Mutex<Vec<ConsensusMessage>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<ConsensusMessage> {
        self.sent.lock().clone()
    }

    pub fn take(&self) -> Vec<ConsensusMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Votes sent so far, in order.
    pub fn votes(&self) -> Vec<Vote> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| m.as_vote().copied())
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, message: &ConsensusMessage) {
        self.sent.lock().push(message.clone());
    }
}

/// Gossips every vote twice: as decided, and a second one for a different
/// value signed with the same key.
pub struct EquivocatingBroadcaster<B> {
    inner: B,
    signer: LocalSigner,
}

impl<B: Broadcaster> EquivocatingBroadcaster<B> {
    pub fn new(inner: B, signer: LocalSigner) -> Self {
        Self { inner, signer }
    }
}

impl<B: Broadcaster> Broadcaster for EquivocatingBroadcaster<B> {
    fn broadcast(&self, message: &ConsensusMessage) {
        self.inner.broadcast(message);
        let Some(vote) = message.as_vote() else {
            return;
        };
        let conflicting = Vote {
            value: if vote.is_nil() { [0xEE; 32] } else { NIL_VALUE },
            ..*vote
        };
        let payload = Payload::Vote(conflicting);
        let Ok(digest) = payload.digest() else {
            return;
        };
        if let Ok(signature) = self.signer.sign(&digest) {
            self.inner
                .broadcast(&ConsensusMessage::new(payload, signature, self.signer.address()));
        }
    }
}

/// Never sends anything: a crashed or muted member.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl Behaviour for Silent {
    fn proposal(&self, _state: &TendermintState, _block: &Block) -> Option<Block> {
        None
    }

    fn prevote(&self, _state: &TendermintState, _value: Hash) -> Option<Hash> {
        None
    }

    fn precommit(&self, _state: &TendermintState, _value: Hash) -> Option<Hash> {
        None
    }
}

/// Votes nil whatever the algorithm decides.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysNil;

impl Behaviour for AlwaysNil {
    fn prevote(&self, _state: &TendermintState, _value: Hash) -> Option<Hash> {
        Some(NIL_VALUE)
    }

    fn precommit(&self, _state: &TendermintState, _value: Hash) -> Option<Hash> {
        Some(NIL_VALUE)
    }
}

/// Deterministic signers from small seeds, sorted by address so index `i`
/// is committee member `i`.
pub fn signers(count: u8) -> Vec<LocalSigner> {
    let mut signers: Vec<LocalSigner> = (1..=count)
        .filter_map(|i| LocalSigner::from_bytes(&[i; 32]).ok())
        .collect();
    signers.sort_by_key(|s| s.address());
    signers
}

/// Sign `payload` as `signer`, producing what ingress would.
pub fn signed(signer: &LocalSigner, payload: Payload) -> ConsensusMessage {
    let signature = payload
        .digest()
        .ok()
        .and_then(|d| signer.sign(&d).ok())
        .unwrap_or_default();
    ConsensusMessage::new(payload, signature, signer.address())
}
