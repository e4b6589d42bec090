//! # Tendermint BFT Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/harness.rs     # In-process validator network
//! ├── src/integration/   # Multi-validator scenarios
//! └── benches/           # Message store benchmarks
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bft-tests
//! cargo test -p bft-tests integration::safety
//! cargo bench -p bft-tests
//! ```

pub mod harness;
pub mod integration;

pub use harness::{SimNetwork, SimNetworkBuilder, SimNode};
