//! Buffer for messages ahead of the current view
//!
//! Keyed by sender so one peer cannot crowd out the others. Senders outside
//! the current committee cost nothing to create, so together they share a
//! single budget. Replay order is by round, then proposals before
//! precommits before prevotes.

use crate::domain::ConsensusMessage;
use bft_types::{short_hex, Address, Height, Round};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug)]
pub struct Backlog {
    own_address: Address,
    height_window: u64,
    per_sender: usize,
    outsider_cap: usize,
    messages: HashMap<Address, Vec<ConsensusMessage>>,
    outsiders: HashSet<Address>,
    outsider_len: usize,
    len: usize,
}

impl Backlog {
    pub fn new(
        own_address: Address,
        height_window: u64,
        per_sender: usize,
        outsider_cap: usize,
    ) -> Self {
        Self {
            own_address,
            height_window,
            per_sender,
            outsider_cap,
            messages: HashMap::new(),
            outsiders: HashSet::new(),
            outsider_len: 0,
            len: 0,
        }
    }

    /// Buffer `message`. Returns `false` when it was dropped instead: own
    /// messages, heights outside the window, senders at their cap and
    /// non-members once the shared outsider budget is spent.
    ///
    /// `is_member` is whether the sender belongs to the current committee.
    pub fn push(
        &mut self,
        message: ConsensusMessage,
        current_height: Height,
        is_member: bool,
    ) -> bool {
        let sender = message.sender();
        if sender == self.own_address {
            return false;
        }
        if message.height() < current_height
            || message.height() > current_height.saturating_add(self.height_window)
        {
            debug!(?message, current_height, "Message outside backlog window");
            return false;
        }
        if !is_member && self.outsider_len >= self.outsider_cap {
            debug!(sender = %short_hex(&sender), "Backlog full for non-members");
            return false;
        }
        let queue = self.messages.entry(sender).or_default();
        if queue.len() >= self.per_sender {
            debug!(sender = %short_hex(&sender), "Backlog full for sender");
            return false;
        }
        if queue.contains(&message) {
            return false;
        }
        queue.push(message);
        self.len += 1;
        if !is_member {
            self.outsiders.insert(sender);
            self.outsider_len += 1;
        }
        true
    }

    /// Remove and return every message the view `(height, round)` can now
    /// process, in replay order. Messages for past heights are discarded.
    pub fn take_ready(&mut self, height: Height, round: Round) -> Vec<ConsensusMessage> {
        let mut ready = Vec::new();
        for queue in self.messages.values_mut() {
            queue.retain(|m| {
                if m.height() < height {
                    return false;
                }
                if m.height() == height && m.round() <= round {
                    ready.push(m.clone());
                    return false;
                }
                true
            });
        }
        self.recount();
        ready.sort_by_key(|m| (m.round(), m.kind()));
        ready
    }

    pub fn clear_below(&mut self, height: Height) {
        for queue in self.messages.values_mut() {
            queue.retain(|m| m.height() >= height);
        }
        self.recount();
    }

    fn recount(&mut self) {
        self.messages.retain(|_, q| !q.is_empty());
        let messages = &self.messages;
        self.outsiders.retain(|sender| messages.contains_key(sender));
        self.len = messages.values().map(Vec::len).sum();
        self.outsider_len = self
            .outsiders
            .iter()
            .filter_map(|sender| messages.get(sender))
            .map(Vec::len)
            .sum();
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn sender_len(&self, sender: &Address) -> usize {
        self.messages.get(sender).map_or(0, Vec::len)
    }

    /// Messages currently held for senders outside the committee.
    pub fn outsider_len(&self) -> usize {
        self.outsider_len
    }
}
