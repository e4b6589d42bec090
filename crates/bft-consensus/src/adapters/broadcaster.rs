//! Gossip adapter

use crate::domain::{ConsensusMessage, SignedMessage};
use crate::ports::Broadcaster;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Hands outgoing messages in wire form to the network task.
#[derive(Clone, Debug)]
pub struct ChannelBroadcaster {
    outbound: mpsc::UnboundedSender<SignedMessage>,
}

impl ChannelBroadcaster {
    pub fn new(outbound: mpsc::UnboundedSender<SignedMessage>) -> Self {
        Self { outbound }
    }

    /// A broadcaster and the receiving end the network task reads.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SignedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast(&self, message: &ConsensusMessage) {
        trace!(?message, "Broadcasting");
        if self.outbound.send(message.to_signed()).is_err() {
            warn!(?message, "Network task gone, message not gossiped");
        }
    }
}
