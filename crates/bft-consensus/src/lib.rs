//! # bft-consensus
//!
//! Tendermint round-based Byzantine fault tolerant consensus.
//!
//! ## Architecture
//!
//! A committee of weighted validators decides one block per height. Each
//! height runs rounds of three steps (propose, prevote, precommit). A
//! validator locks on a value once it sees more than two thirds of the
//! voting power prevote it, and commits once more than two thirds
//! precommit it. Safety holds while faulty members control less than a
//! third of the power; liveness needs eventual synchrony.
//!
//! ```text
//!   network ──SignedMessage──→ [ingress] ──┐
//!   timers  ──TimeoutToken──────────────────┼──→ event queue ──→ [Core]
//!   chain   ──candidate / finalized──────────┘                     │
//!                                                                  ├──→ Broadcaster
//!                                                                  ├──→ Backend::commit
//!                                                                  └──→ WAL
//! ```
//!
//! ### Hexagonal layout
//!
//! - [`domain`]: messages, committee, message store, state record, seal
//! - [`engine`]: the state machine and its upon-rules
//! - [`ports`]: traits the engine drives and the API it exposes
//! - [`adapters`]: tokio timers, channel gossip, in-memory WAL, local signer
//! - [`service`]: async event loop, ingress verification, backlog
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bft_consensus::{ConsensusConfig, ConsensusService, ServiceDependencies};
//! use bft_consensus::domain::Honest;
//!
//! let (service, handle) = ConsensusService::new(
//!     ConsensusConfig::from_env(),
//!     ServiceDependencies {
//!         backend,
//!         committee_provider,
//!         broadcaster,
//!         behaviour: Arc::new(Honest),
//!         wal: None,
//!     },
//! )?;
//! tokio::spawn(service.run());
//!
//! // From the network task
//! handle.submit_message(signed_message).await?;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;

/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main types
pub use adapters::{ChannelBroadcaster, InMemoryWal, LocalSigner, TokioTimeoutScheduler};
pub use config::{ConsensusConfig, MAX_ROUND};
pub use domain::{
    AggregateSeal, BackendError, Behaviour, Committee, CommitteeMember, ConsensusMessage,
    CoreError, CoreResult, Honest, MessageKind, Payload, Proposal, RoundRobinCommittee,
    SignedMessage, Step, TendermintState, Vote, VoteKind,
};
pub use engine::{Core, CoreDependencies, CoreSnapshot, Disposition, TimeoutPhase, TimeoutToken};
pub use events::ConsensusEvent;
pub use ports::{
    Backend, Broadcaster, CommitteeProvider, ConsensusApi, ConsensusWal, TimeoutScheduler,
};
pub use service::{
    ConsensusHandle, ConsensusService, IngressError, ServiceDependencies, ServiceError,
    ServiceResult,
};
