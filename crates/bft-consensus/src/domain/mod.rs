//! Domain layer
//!
//! Pure consensus types: messages, committee, the per-height message
//! store, the state record and the commit seal. Nothing here performs I/O.

mod behaviour;
mod committee;
mod error;
mod message;
mod round_messages;
mod seal;
mod state;
mod vote_set;

pub use behaviour::*;
pub use committee::*;
pub use error::*;
pub use message::*;
pub use round_messages::*;
pub use seal::*;
pub use state::*;
pub use vote_set::*;
