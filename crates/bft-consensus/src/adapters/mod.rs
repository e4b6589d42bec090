//! Adapters layer (Hexagonal Architecture)
//!
//! Concrete implementations of the outbound ports.

mod broadcaster;
mod signer;
mod timers;
mod wal;

pub use broadcaster::*;
pub use signer::*;
pub use timers::*;
pub use wal::*;
