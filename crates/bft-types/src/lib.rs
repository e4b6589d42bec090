//! # BFT Types Crate
//!
//! Primitives shared across the consensus workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: heights, rounds, hashes and addresses are
//!   defined once here and used by every crate.
//! - **Opaque Blocks**: consensus only needs a block's hash, height and
//!   proposer; everything else is carried as payload for the backend.
//! - **Recoverable Signatures**: a vote's sender is the address recovered
//!   from its signature, never a self-declared field.

pub mod crypto;
pub mod entities;
pub mod errors;

pub use crypto::{address_from_pubkey, keccak256, recover_address, sign_hash};
pub use entities::*;
pub use errors::*;
