//! # Consensus Metrics
//!
//! Prometheus metrics for the Tendermint engine.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! bft-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `bft_rounds_started_total` - Rounds entered
//! - `bft_current_height` / `bft_current_round` - Current view
//! - `bft_commits_total` - Blocks handed to the backend, by decision round
//! - `bft_round_skips_total` - Jumps caused by future-round power above f
//! - `bft_timeouts_total` - Fired timeouts, by phase
//! - `bft_messages_received_total` - Messages reaching the core, by kind
//! - `bft_proposals_rejected_total` - Rejected proposals, by reason
//! - `bft_backlog_messages` - Messages waiting in the backlog

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref ROUNDS_STARTED: IntCounter = register_int_counter!(
        "bft_rounds_started_total",
        "Total number of rounds entered"
    )
    .expect("Failed to create ROUNDS_STARTED metric");

    pub static ref CURRENT_HEIGHT: IntGauge = register_int_gauge!(
        "bft_current_height",
        "Height currently being decided"
    )
    .expect("Failed to create CURRENT_HEIGHT metric");

    pub static ref CURRENT_ROUND: IntGauge = register_int_gauge!(
        "bft_current_round",
        "Round currently being played"
    )
    .expect("Failed to create CURRENT_ROUND metric");

    /// Commits labeled by whether the decision happened at round 0
    pub static ref COMMITS: IntCounterVec = register_int_counter_vec!(
        "bft_commits_total",
        "Total number of blocks committed",
        &["round"]
    )
    .expect("Failed to create COMMITS metric");

    pub static ref ROUND_SKIPS: IntCounter = register_int_counter!(
        "bft_round_skips_total",
        "Total number of round skips triggered by future-round messages"
    )
    .expect("Failed to create ROUND_SKIPS metric");

    pub static ref TIMEOUTS: IntCounterVec = register_int_counter_vec!(
        "bft_timeouts_total",
        "Total number of fired timeouts",
        &["phase"]
    )
    .expect("Failed to create TIMEOUTS metric");

    pub static ref MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        "bft_messages_received_total",
        "Total number of consensus messages reaching the core",
        &["kind"]
    )
    .expect("Failed to create MESSAGES_RECEIVED metric");

    pub static ref PROPOSALS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "bft_proposals_rejected_total",
        "Total number of rejected proposals",
        &["reason"]
    )
    .expect("Failed to create PROPOSALS_REJECTED metric");

    pub static ref BACKLOG_SIZE: IntGauge = register_int_gauge!(
        "bft_backlog_messages",
        "Messages buffered for a future view"
    )
    .expect("Failed to create BACKLOG_SIZE metric");
}

#[cfg(feature = "metrics")]
pub fn record_round_started(round: i64) {
    ROUNDS_STARTED.inc();
    CURRENT_ROUND.set(round);
}

#[cfg(feature = "metrics")]
pub fn record_height_changed(height: u64) {
    CURRENT_HEIGHT.set(height as i64);
}

#[cfg(feature = "metrics")]
pub fn record_commit(round: i64) {
    let label = if round == 0 { "first" } else { "later" };
    COMMITS.with_label_values(&[label]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_round_skip() {
    ROUND_SKIPS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_timeout(phase: &str) {
    TIMEOUTS.with_label_values(&[phase]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_message_received(kind: &str) {
    MESSAGES_RECEIVED.with_label_values(&[kind]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_proposal_rejected(reason: &str) {
    PROPOSALS_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn set_backlog_size(size: usize) {
    BACKLOG_SIZE.set(size as i64);
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_round_started(_round: i64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_height_changed(_height: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_commit(_round: i64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_round_skip() {}

#[cfg(not(feature = "metrics"))]
pub fn record_timeout(_phase: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_message_received(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_proposal_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn set_backlog_size(_size: usize) {}
