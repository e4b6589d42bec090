//! Outgoing-message strategy
//!
//! The core asks a [`Behaviour`] what to actually send whenever the
//! algorithm decides to propose or vote. Returning `None` sends nothing;
//! the core still records that the step was taken.

use super::state::TendermintState;
use bft_types::{Block, Hash};
use std::fmt::Debug;

pub trait Behaviour: Send + Sync + Debug {
    fn proposal(&self, _state: &TendermintState, block: &Block) -> Option<Block> {
        Some(block.clone())
    }

    fn prevote(&self, _state: &TendermintState, value: Hash) -> Option<Hash> {
        Some(value)
    }

    fn precommit(&self, _state: &TendermintState, value: Hash) -> Option<Hash> {
        Some(value)
    }
}

/// Follows the algorithm exactly.
#[derive(Clone, Copy, Debug, Default)]
pub struct Honest;

impl Behaviour for Honest {}
