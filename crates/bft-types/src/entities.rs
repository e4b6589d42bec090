//! # Core Entities
//!
//! The vocabulary consensus is expressed in.
//!
//! - **Identity**: `Address`, `Signature`
//! - **Position**: `Height`, `Round`
//! - **Weight**: `VotingPower`
//! - **Value**: `Block`, `BlockHeader`, `Hash`

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;

use crate::crypto::keccak256;

/// A 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// Block slot currently being agreed upon.
pub type Height = u64;

/// Attempt number within a height.
///
/// Signed because `-1` is the protocol's "no round" sentinel for locked and
/// valid rounds and for a fresh proposal's valid round.
pub type Round = i64;

/// Aggregated stake weight of committee members.
pub type VotingPower = u128;

/// The nil value voted for when no block is acceptable.
pub const NIL_VALUE: Hash = [0u8; 32];

/// Sentinel round meaning "nothing locked or valid yet".
pub const NO_ROUND: Round = -1;

/// Returns true when `value` is the nil sentinel.
pub fn is_nil(value: &Hash) -> bool {
    *value == NIL_VALUE
}

/// Short hex prefix of a hash for log fields.
pub fn short_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// A 65-byte recoverable secp256k1 signature (`r || s || v`).
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(#[serde_as(as = "Bytes")] pub [u8; 65]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature([0u8; 65])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", short_hex(&self.0))
    }
}

/// Header of a block proposed for consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Height this block would occupy.
    pub height: Height,
    /// Hash of the parent block.
    pub parent_hash: Hash,
    /// Validator that built the block.
    pub proposer: Address,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Keccak root over the payload entries.
    pub payload_root: Hash,
    pub extra_data: Vec<u8>,
}

impl BlockHeader {
    /// Compute the hash of this header.
    pub fn hash(&self) -> Hash {
        use sha3::{Digest, Keccak256};
        let mut hasher = Keccak256::new();
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.parent_hash);
        hasher.update(self.proposer);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.payload_root);
        hasher.update(&self.extra_data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }

    /// Check if this is a genesis header.
    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.parent_hash == [0u8; 32]
    }
}

/// A block as seen by consensus: a header and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Vec<Vec<u8>>,
}

impl Block {
    /// Build a block over `payload`, filling in the payload root.
    pub fn new(
        height: Height,
        parent_hash: Hash,
        proposer: Address,
        timestamp: u64,
        payload: Vec<Vec<u8>>,
    ) -> Self {
        let header = BlockHeader {
            height,
            parent_hash,
            proposer,
            timestamp,
            payload_root: payload_root(&payload),
            extra_data: Vec::new(),
        };
        Self { header, payload }
    }

    /// Genesis block with an empty payload.
    pub fn genesis() -> Self {
        Self::default()
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> Height {
        self.header.height
    }

    /// True when the header's payload root matches the payload.
    pub fn payload_matches_root(&self) -> bool {
        self.header.payload_root == payload_root(&self.payload)
    }
}

/// Root over payload entries: keccak of the concatenated entry hashes.
pub fn payload_root(payload: &[Vec<u8>]) -> Hash {
    if payload.is_empty() {
        return [0u8; 32];
    }
    let mut joined = Vec::with_capacity(payload.len() * 32);
    for entry in payload {
        joined.extend_from_slice(&keccak256(entry));
    }
    keccak256(&joined)
}
