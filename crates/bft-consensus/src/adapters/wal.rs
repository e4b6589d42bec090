//! In-memory write-ahead log

use crate::domain::{ConsensusMessage, TendermintState, WalError};
use crate::ports::{ConsensusWal, WalRecord};
use bft_types::Height;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Keeps WAL records in memory. Clones share the same log, so a test can
/// hand one clone to a core, drop the core, and restore a new one from
/// another clone.
#[derive(Clone, Debug, Default)]
pub struct InMemoryWal {
    records: Arc<RwLock<BTreeMap<Height, WalRecord>>>,
}

impl InMemoryWal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heights(&self) -> Vec<Height> {
        self.records.read().keys().copied().collect()
    }

    pub fn message_count(&self, height: Height) -> usize {
        self.records
            .read()
            .get(&height)
            .map_or(0, |r| r.messages.len())
    }
}

impl ConsensusWal for InMemoryWal {
    fn append_message(
        &self,
        height: Height,
        sequence: u64,
        message: &ConsensusMessage,
    ) -> Result<(), WalError> {
        let mut records = self.records.write();
        let record = records.entry(height).or_default();
        if let Some((last, _)) = record.messages.last() {
            if sequence <= *last {
                return Err(WalError::OutOfOrder {
                    height,
                    last: *last,
                    got: sequence,
                });
            }
        }
        record.messages.push((sequence, message.clone()));
        Ok(())
    }

    fn save_state(&self, state: &TendermintState) -> Result<(), WalError> {
        self.records
            .write()
            .entry(state.height())
            .or_default()
            .state = Some(state.clone());
        Ok(())
    }

    fn load(&self, height: Height) -> Result<Option<WalRecord>, WalError> {
        Ok(self.records.read().get(&height).cloned())
    }

    fn truncate_below(&self, height: Height) -> Result<(), WalError> {
        self.records.write().retain(|h, _| *h >= height);
        Ok(())
    }
}
