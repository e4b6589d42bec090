//! Consensus messages and their canonical encoding
//!
//! A message travels as a [`SignedMessage`]: payload plus signature, no
//! sender field. The sender is recovered from the signature at ingress,
//! producing a [`ConsensusMessage`], which is the only form the core
//! accepts.

use bft_types::{
    is_nil, keccak256, recover_address, short_hex, Address, Block, CryptoError, EncodingError,
    Hash, Height, Round, Signature, NIL_VALUE,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a consensus message.
///
/// Ordered by backlog replay priority: proposals first, then precommits,
/// then prevotes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Proposal,
    Precommit,
    Prevote,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Proposal => "proposal",
            MessageKind::Prevote => "prevote",
            MessageKind::Precommit => "precommit",
        }
    }
}

/// The two voting phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteKind {
    Prevote,
    Precommit,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Prevote => "prevote",
            VoteKind::Precommit => "precommit",
        }
    }
}

/// A block proposed for `(height, round)`.
///
/// `valid_round` is `-1` for a fresh value, otherwise the earlier round at
/// which the proposer saw a prevote quorum for this block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub height: Height,
    pub round: Round,
    pub valid_round: Round,
    pub block: Block,
}

impl Proposal {
    pub fn value(&self) -> Hash {
        self.block.hash()
    }
}

/// A prevote or precommit for a block hash or for nil.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vote {
    pub kind: VoteKind,
    pub height: Height,
    pub round: Round,
    pub value: Hash,
}

impl Vote {
    pub fn prevote(height: Height, round: Round, value: Hash) -> Self {
        Self {
            kind: VoteKind::Prevote,
            height,
            round,
            value,
        }
    }

    pub fn precommit(height: Height, round: Round, value: Hash) -> Self {
        Self {
            kind: VoteKind::Precommit,
            height,
            round,
            value,
        }
    }

    pub fn is_nil(&self) -> bool {
        is_nil(&self.value)
    }
}

/// Signed content of a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Proposal(Proposal),
    Vote(Vote),
}

/// Canonical form signed for a proposal. The block is represented by its
/// hash so the signature does not depend on payload serialization.
#[derive(Serialize)]
struct ProposalSigningView {
    height: Height,
    round: Round,
    valid_round: Round,
    value: Hash,
}

impl Payload {
    pub fn height(&self) -> Height {
        match self {
            Payload::Proposal(p) => p.height,
            Payload::Vote(v) => v.height,
        }
    }

    pub fn round(&self) -> Round {
        match self {
            Payload::Proposal(p) => p.round,
            Payload::Vote(v) => v.round,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Proposal(_) => MessageKind::Proposal,
            Payload::Vote(v) => match v.kind {
                VoteKind::Prevote => MessageKind::Prevote,
                VoteKind::Precommit => MessageKind::Precommit,
            },
        }
    }

    /// The voted or proposed value.
    pub fn value(&self) -> Hash {
        match self {
            Payload::Proposal(p) => p.value(),
            Payload::Vote(v) => v.value,
        }
    }

    /// Canonical bytes covered by the signature.
    ///
    /// Votes encode `(kind, height, round, value)`; a precommit signature
    /// over these bytes is the committed seal for its value.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        let bytes = match self {
            Payload::Proposal(p) => bincode::serialize(&(
                MessageKind::Proposal,
                ProposalSigningView {
                    height: p.height,
                    round: p.round,
                    valid_round: p.valid_round,
                    value: p.value(),
                },
            ))?,
            Payload::Vote(v) => bincode::serialize(&(v.kind, v.height, v.round, v.value))?,
        };
        Ok(bytes)
    }

    /// Keccak digest of [`Payload::signing_bytes`].
    pub fn digest(&self) -> Result<Hash, EncodingError> {
        Ok(keccak256(&self.signing_bytes()?))
    }
}

/// Wire form: payload and signature, sender implied by the signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub payload: Payload,
    pub signature: Signature,
}

impl SignedMessage {
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        bincode::deserialize(bytes).map_err(|e| EncodingError::Decode(e.to_string()))
    }

    /// Recover the signer address.
    pub fn recover_sender(&self) -> Result<Address, CryptoError> {
        let digest = self
            .payload
            .digest()
            .map_err(|_| CryptoError::InvalidFormat)?;
        recover_address(&digest, &self.signature)
    }
}

/// A message whose sender has been established from its signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusMessage {
    payload: Payload,
    signature: Signature,
    sender: Address,
}

impl ConsensusMessage {
    /// Pair a payload with its signature and the sender recovered from it.
    ///
    /// Callers outside ingress verification are expected to have produced
    /// the signature themselves.
    pub fn new(payload: Payload, signature: Signature, sender: Address) -> Self {
        Self {
            payload,
            signature,
            sender,
        }
    }

    /// Recover the sender of a wire message.
    pub fn from_signed(signed: SignedMessage) -> Result<Self, CryptoError> {
        let sender = signed.recover_sender()?;
        Ok(Self {
            payload: signed.payload,
            signature: signed.signature,
            sender,
        })
    }

    pub fn to_signed(&self) -> SignedMessage {
        SignedMessage {
            payload: self.payload.clone(),
            signature: self.signature,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn height(&self) -> Height {
        self.payload.height()
    }

    pub fn round(&self) -> Round {
        self.payload.round()
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn value(&self) -> Hash {
        self.payload.value()
    }

    pub fn as_proposal(&self) -> Option<&Proposal> {
        match &self.payload {
            Payload::Proposal(p) => Some(p),
            Payload::Vote(_) => None,
        }
    }

    pub fn as_vote(&self) -> Option<&Vote> {
        match &self.payload {
            Payload::Vote(v) => Some(v),
            Payload::Proposal(_) => None,
        }
    }
}

impl fmt::Debug for ConsensusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(h={}, r={}, v={}, from={})",
            self.kind().as_str(),
            self.height(),
            self.round(),
            if self.value() == NIL_VALUE {
                "nil".to_string()
            } else {
                short_hex(&self.value())
            },
            short_hex(&self.sender)
        )
    }
}
