//! Consensus configuration

use bft_types::Round;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Highest round the engine will enter or store messages for.
pub const MAX_ROUND: Round = 99;

/// Timeouts and buffer limits.
///
/// Each phase timeout grows linearly with the round number so that, once
/// the network becomes synchronous, some round lasts long enough to decide.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub initial_propose_timeout_ms: u64,
    pub propose_timeout_delta_ms: u64,
    pub initial_prevote_timeout_ms: u64,
    pub prevote_timeout_delta_ms: u64,
    pub initial_precommit_timeout_ms: u64,
    pub precommit_timeout_delta_ms: u64,
    /// Target block interval in seconds, added to the propose timeout.
    pub block_period_secs: u64,
    pub max_round: Round,
    /// How many heights ahead of the current one the backlog accepts.
    pub backlog_height_window: u64,
    /// Buffered messages kept per sender.
    pub backlog_per_sender: usize,
    /// Buffered messages kept for all senders outside the current
    /// committee together.
    pub backlog_outsider_cap: usize,
    /// Capacity of the service event queue.
    pub event_queue_capacity: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            initial_propose_timeout_ms: 3_000,
            propose_timeout_delta_ms: 500,
            initial_prevote_timeout_ms: 1_000,
            prevote_timeout_delta_ms: 500,
            initial_precommit_timeout_ms: 1_000,
            precommit_timeout_delta_ms: 500,
            block_period_secs: 1,
            max_round: MAX_ROUND,
            backlog_height_window: 10,
            backlog_per_sender: 1_000,
            backlog_outsider_cap: 1_000,
            event_queue_capacity: 1_024,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ConsensusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BFT_PROPOSE_TIMEOUT_MS` / `BFT_PROPOSE_TIMEOUT_DELTA_MS`
    /// - `BFT_PREVOTE_TIMEOUT_MS` / `BFT_PREVOTE_TIMEOUT_DELTA_MS`
    /// - `BFT_PRECOMMIT_TIMEOUT_MS` / `BFT_PRECOMMIT_TIMEOUT_DELTA_MS`
    /// - `BFT_BLOCK_PERIOD_SECS`
    /// - `BFT_BACKLOG_HEIGHT_WINDOW`, `BFT_BACKLOG_PER_SENDER`,
    ///   `BFT_BACKLOG_OUTSIDER_CAP`
    /// - `BFT_EVENT_QUEUE_CAPACITY`
    ///
    /// Unset or unparsable variables keep their defaults. The round limit is
    /// fixed.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            initial_propose_timeout_ms: env_or("BFT_PROPOSE_TIMEOUT_MS", d.initial_propose_timeout_ms),
            propose_timeout_delta_ms: env_or("BFT_PROPOSE_TIMEOUT_DELTA_MS", d.propose_timeout_delta_ms),
            initial_prevote_timeout_ms: env_or("BFT_PREVOTE_TIMEOUT_MS", d.initial_prevote_timeout_ms),
            prevote_timeout_delta_ms: env_or("BFT_PREVOTE_TIMEOUT_DELTA_MS", d.prevote_timeout_delta_ms),
            initial_precommit_timeout_ms: env_or(
                "BFT_PRECOMMIT_TIMEOUT_MS",
                d.initial_precommit_timeout_ms,
            ),
            precommit_timeout_delta_ms: env_or(
                "BFT_PRECOMMIT_TIMEOUT_DELTA_MS",
                d.precommit_timeout_delta_ms,
            ),
            block_period_secs: env_or("BFT_BLOCK_PERIOD_SECS", d.block_period_secs),
            max_round: d.max_round,
            backlog_height_window: env_or("BFT_BACKLOG_HEIGHT_WINDOW", d.backlog_height_window),
            backlog_per_sender: env_or("BFT_BACKLOG_PER_SENDER", d.backlog_per_sender),
            backlog_outsider_cap: env_or("BFT_BACKLOG_OUTSIDER_CAP", d.backlog_outsider_cap),
            event_queue_capacity: env_or("BFT_EVENT_QUEUE_CAPACITY", d.event_queue_capacity),
        }
    }

    /// Small timeouts for tests and local networks.
    pub fn fast() -> Self {
        Self {
            initial_propose_timeout_ms: 200,
            propose_timeout_delta_ms: 50,
            initial_prevote_timeout_ms: 100,
            prevote_timeout_delta_ms: 50,
            initial_precommit_timeout_ms: 100,
            precommit_timeout_delta_ms: 50,
            block_period_secs: 0,
            ..Self::default()
        }
    }

    fn round_factor(round: Round) -> u64 {
        round.max(0) as u64
    }

    /// `initial + round * delta`, saturating at `u64::MAX` milliseconds.
    fn linear_ms(initial: u64, delta: u64, round: Round) -> u64 {
        initial.saturating_add(Self::round_factor(round).saturating_mul(delta))
    }

    pub fn propose_timeout(&self, round: Round) -> Duration {
        let base = Self::linear_ms(
            self.initial_propose_timeout_ms,
            self.propose_timeout_delta_ms,
            round,
        );
        Duration::from_millis(base.saturating_add(self.block_period_secs.saturating_mul(1_000)))
    }

    pub fn prevote_timeout(&self, round: Round) -> Duration {
        Duration::from_millis(Self::linear_ms(
            self.initial_prevote_timeout_ms,
            self.prevote_timeout_delta_ms,
            round,
        ))
    }

    pub fn precommit_timeout(&self, round: Round) -> Duration {
        Duration::from_millis(Self::linear_ms(
            self.initial_precommit_timeout_ms,
            self.precommit_timeout_delta_ms,
            round,
        ))
    }

    /// Event queue capacity, at least one slot.
    pub fn queue_capacity(&self) -> usize {
        self.event_queue_capacity.max(1)
    }
}
